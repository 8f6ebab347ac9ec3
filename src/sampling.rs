use tracing::warn;

/// Index of the first entry whose running sum exceeds `threshold`, skipping
/// zero-weight entries. `None` if the total never exceeds it.
pub fn inverse_cdf(weights: &[f64], threshold: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if w > 0.0 && threshold < cumulative {
            return Some(i);
        }
    }
    // Rounding can leave the threshold a hair above the final sum.
    weights.iter().rposition(|&w| w > 0.0)
}

/// Draws an index from `probs`, whose total mass is `total`, using the
/// uniform variate `u` in [0, 1).
///
/// A posterior with no usable mass is not an error: the draw falls back to
/// uniform over `support`, the prior mask of regions the token may take.
pub fn draw(probs: &[f64], total: f64, support: &[f64], u: f64) -> usize {
    if total > 0.0 && total.is_finite() {
        if let Some(i) = inverse_cdf(probs, u * total) {
            return i;
        }
    }
    warn!("degenerate posterior, falling back to uniform over candidate regions");
    let mass: f64 = support.iter().sum();
    inverse_cdf(support, u * mass).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_cdf_boundaries() {
        let weights = [0.2, 0.3, 0.5];
        assert_eq!(inverse_cdf(&weights, 0.0), Some(0));
        assert_eq!(inverse_cdf(&weights, 0.19), Some(0));
        assert_eq!(inverse_cdf(&weights, 0.21), Some(1));
        assert_eq!(inverse_cdf(&weights, 0.99), Some(2));
        assert_eq!(inverse_cdf(&weights, 1.5), Some(2));
    }

    #[test]
    fn test_zero_weights_are_never_drawn() {
        let weights = [0.0, 1.0, 0.0];
        assert_eq!(inverse_cdf(&weights, 0.0), Some(1));
        assert_eq!(inverse_cdf(&weights, 0.999), Some(1));
        assert_eq!(inverse_cdf(&[0.0, 0.0], 0.0), None);
    }

    #[test]
    fn test_draw_scales_by_returned_total() {
        let probs = [2.0, 3.0, 5.0];
        assert_eq!(draw(&probs, 10.0, &[1.0; 3], 0.45), 1);
        assert_eq!(draw(&probs, 10.0, &[1.0; 3], 0.55), 2);
    }

    #[test]
    fn test_degenerate_posterior_uses_support() {
        let probs = [0.0, 0.0, 0.0, 0.0];
        let support = [0.0, 1.0, 0.0, 1.0];
        assert_eq!(draw(&probs, 0.0, &support, 0.1), 1);
        assert_eq!(draw(&probs, 0.0, &support, 0.9), 3);
    }
}
