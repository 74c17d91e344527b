//! Camera motion blur, evaluated inside the HDR stage from the G-buffer
//! velocity channel.

use crate::errors::Result;

use super::invalid;

pub const MAX_MOTION_BLUR_SAMPLES: u32 = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct MotionBlurSettings {
    pub enabled: bool,
    /// Scale applied to the per-pixel velocity. `1.0` blurs across exactly one
    /// frame of motion.
    pub strength: f32,
    /// Taps along the velocity vector.
    pub samples: u32,
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
            samples: 8,
        }
    }
}

impl MotionBlurSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.strength.is_finite() && self.strength >= 0.0) {
            return Err(invalid("motion_blur", "strength must be non-negative"));
        }
        if self.samples == 0 || self.samples > MAX_MOTION_BLUR_SAMPLES {
            return Err(invalid(
                "motion_blur",
                format!("samples must be in 1..={MAX_MOTION_BLUR_SAMPLES}"),
            ));
        }
        Ok(())
    }
}
