//! Lens distortion and chromatic dispersion.
//!
//! Radial distortion follows the usual polynomial model
//! `r' = r * (1 + k1 * r^2 + k2 * r^4)`, evaluated per color channel with the
//! channels offset by `dispersion`.

use crate::errors::Result;

use super::invalid;

#[derive(Debug, Clone, PartialEq)]
pub struct LensSettings {
    pub enabled: bool,
    /// Quadratic distortion coefficient (`k1`). Positive is barrel.
    pub distortion: f32,
    /// Quartic distortion coefficient (`k2`).
    pub cubic_distortion: f32,
    /// Per-channel spread of the distortion (chromatic aberration).
    pub dispersion: f32,
    /// Zoom applied after distortion to hide the stretched border.
    pub scale: f32,
}

impl Default for LensSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            distortion: 0.05,
            cubic_distortion: 0.0,
            dispersion: 0.01,
            scale: 1.0,
        }
    }
}

impl LensSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.distortion.is_finite() && self.cubic_distortion.is_finite()) {
            return Err(invalid("lens", "distortion coefficients must be finite"));
        }
        if !(self.dispersion.is_finite() && self.dispersion >= 0.0) {
            return Err(invalid("lens", "dispersion must be non-negative"));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(invalid("lens", format!("scale must be positive, got {}", self.scale)));
        }
        Ok(())
    }
}
