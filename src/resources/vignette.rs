//! Vignette (edge darkening), applied by the finalizer.

use glam::Vec4;

use crate::errors::Result;

use super::invalid;

#[derive(Debug, Clone, PartialEq)]
pub struct VignetteSettings {
    pub enabled: bool,
    /// Darkening strength at the corners.
    pub intensity: f32,
    /// Width of the falloff band, in `(0, 1]`.
    pub smoothness: f32,
    /// Tint the edges fade toward.
    pub color: Vec4,
}

impl Default for VignetteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 0.3,
            smoothness: 0.5,
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

impl VignetteSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intensity as uploaded: zero when disabled.
    #[inline]
    #[must_use]
    pub fn effective_intensity(&self) -> f32 {
        if self.enabled { self.intensity } else { 0.0 }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.intensity.is_finite() && self.intensity >= 0.0) {
            return Err(invalid("vignette", "intensity must be non-negative"));
        }
        if !(self.smoothness > 0.0 && self.smoothness <= 1.0) {
            return Err(invalid(
                "vignette",
                format!("smoothness must be in (0, 1], got {}", self.smoothness),
            ));
        }
        Ok(())
    }
}
