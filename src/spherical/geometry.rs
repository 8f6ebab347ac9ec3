//! Conversions between geographic coordinates and unit vectors.
//!
//! Convention: latitude maps to the polar angle θ measured from the north
//! pole (θ = 0 at +90°, π at −90°), longitude to the azimuth φ in radians.
//! A point is then `[sin θ cos φ, sin θ sin φ, cos θ]`, so the north pole is
//! +z and (0°, 0°) is +x. Every lat/long ↔ vector transition goes through
//! these functions.

use std::f64::consts::PI;

pub fn latitude_to_polar(latitude: f64) -> f64 {
    (latitude / -180.0 + 0.5) * PI
}

pub fn longitude_to_azimuth(longitude: f64) -> f64 {
    longitude / 180.0 * PI
}

/// (θ, φ) for a latitude/longitude in degrees.
pub fn geographic_to_spherical(latitude: f64, longitude: f64) -> (f64, f64) {
    (latitude_to_polar(latitude), longitude_to_azimuth(longitude))
}

pub fn spherical_to_cartesian(theta: f64, phi: f64) -> [f64; 3] {
    [theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()]
}

pub fn cartesian_to_spherical(x: &[f64; 3]) -> (f64, f64) {
    (x[2].clamp(-1.0, 1.0).acos(), x[1].atan2(x[0]))
}

pub fn spherical_to_geographic(theta: f64, phi: f64) -> (f64, f64) {
    (theta / -PI * 180.0 + 90.0, phi / PI * 180.0)
}

pub fn geographic_to_cartesian(latitude: f64, longitude: f64) -> [f64; 3] {
    let (theta, phi) = geographic_to_spherical(latitude, longitude);
    spherical_to_cartesian(theta, phi)
}

/// Latitude/longitude of the direction of `x`, which need not be unit length.
pub fn cartesian_to_geographic(x: &[f64; 3]) -> Option<(f64, f64)> {
    let unit = normalize(x)?;
    let (theta, phi) = cartesian_to_spherical(&unit);
    Some(spherical_to_geographic(theta, phi))
}

pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn l2_norm(x: &[f64; 3]) -> f64 {
    dot(x, x).sqrt()
}

/// Unit vector along `x`; `None` for a (near) zero vector, which has no direction.
pub fn normalize(x: &[f64; 3]) -> Option<[f64; 3]> {
    let norm = l2_norm(x);
    if norm < 1e-12 {
        None
    } else {
        Some([x[0] / norm, x[1] / norm, x[2] / norm])
    }
}

/// von Mises-Fisher kernel `exp(κ⟨x, μ⟩)` up to the constant `exp(κ)`,
/// which keeps it in (0, 1] for unit vectors. A region without a direction
/// contributes `exp(-κ)`, i.e. `⟨x, μ⟩ = 0`.
pub fn vmf_kernel(x: &[f64; 3], mean_direction: Option<&[f64; 3]>, kappa: f64) -> f64 {
    let cosine = mean_direction.map(|mu| dot(x, mu)).unwrap_or(0.0);
    (kappa * (cosine - 1.0)).exp()
}
