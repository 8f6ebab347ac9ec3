use crate::accumulator::CountSnapshot;
use crate::annealing::Annealer;

/// One-shot annealer that collapses a posterior onto its arg-max.
///
/// Used for the final decode only; it never collects samples.
#[derive(Debug, Clone, Default)]
pub struct MaximumPosteriorDecoder {
    spent: bool,
}

impl MaximumPosteriorDecoder {
    pub fn new() -> Self {
        MaximumPosteriorDecoder { spent: false }
    }
}

impl Annealer for MaximumPosteriorDecoder {
    fn next_iter(&mut self) -> bool {
        if self.spent {
            false
        } else {
            self.spent = true;
            true
        }
    }

    /// Zeroes `probs` except for its first maximum, which becomes 1. A vector
    /// with no positive entry is left zeroed and reports no mass.
    fn anneal_probs(&self, probs: &mut [f64]) -> f64 {
        let mut max = 0.0;
        let mut max_index = None;
        for (i, &p) in probs.iter().enumerate() {
            if p > max {
                max = p;
                max_index = Some(i);
            }
        }
        probs.iter_mut().for_each(|p| *p = 0.0);
        match max_index {
            Some(i) => {
                probs[i] = 1.0;
                1.0
            }
            None => 0.0,
        }
    }

    fn collect_samples(&mut self, _snapshot: &CountSnapshot<'_>) {}
}
