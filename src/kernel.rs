//! Gaussian kernel parameters and weights

use crate::error::BlurError;

/// Largest accepted blur radius in texels
pub const MAX_RADIUS: u32 = 128;

/// Parameters of a single-pass Gaussian blur
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParams {
    /// Sample half-width: offsets run over `-radius..=radius` on both axes
    pub radius: u32,
    /// Gaussian spread in texels
    pub sigma: f32,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self {
            radius: 50,
            sigma: 25.0,
        }
    }
}

impl BlurParams {
    pub fn new(radius: u32, sigma: f32) -> Result<Self, BlurError> {
        let params = Self { radius, sigma };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), BlurError> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(BlurError::InvalidParameters(format!(
                "sigma must be a positive finite number, got {}",
                self.sigma
            )));
        }
        if self.radius > MAX_RADIUS {
            return Err(BlurError::InvalidParameters(format!(
                "radius {} exceeds the maximum of {}",
                self.radius, MAX_RADIUS
            )));
        }
        Ok(())
    }
}

/// Unnormalized weight of offset `i`: exp(-i^2 / (2 sigma^2))
#[inline]
pub fn gaussian(i: i32, sigma: f32) -> f32 {
    let i = i as f32;
    (-(i * i) / (2.0 * sigma * sigma)).exp()
}

/// Normalized 1-D weights for offsets `-radius..=radius`.
///
/// The 2-D kernel is the outer product of this with itself, so it sums to 1 too.
pub fn gaussian_weights(radius: u32, sigma: f32) -> Vec<f32> {
    let r = radius as i32;
    let mut weights: Vec<f32> = (-r..=r).map(|i| gaussian(i, sigma)).collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}
