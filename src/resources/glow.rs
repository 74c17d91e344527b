//! Glow Configuration
//!
//! Glow is an iterative separable blur over a half-resolution copy of the
//! resolved scene. Iteration `i` (1-based) blurs with radius `i * spread`, so
//! the kernel widens as the image is blurred repeatedly. The first horizontal
//! pass also applies the bright-pass `threshold`.

use crate::errors::Result;

use super::invalid;

/// Upper bound on blur iterations.
pub const MAX_GLOW_RADIUS: u32 = 16;

/// Glow configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GlowSettings {
    pub enabled: bool,

    /// Number of blur iterations (H then V each).
    ///
    /// Default: `4`
    radius: u32,

    /// Per-iteration growth of the blur radius, in texels.
    ///
    /// Default: `1.0`
    spread: f32,

    /// Luminance below which pixels do not glow.
    ///
    /// Default: `1.0`
    threshold: f32,

    /// How strongly the blurred glow is added back to the scene.
    ///
    /// Default: `0.6`
    intensity: f32,
}

impl Default for GlowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 4,
            spread: 1.0,
            threshold: 1.0,
            intensity: 0.6,
        }
    }
}

impl GlowSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    #[inline]
    #[must_use]
    pub fn spread(&self) -> f32 {
        self.spread
    }

    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Blur radius used by iteration `i` (1-based).
    #[inline]
    #[must_use]
    pub fn iteration_radius(&self, i: u32) -> f32 {
        i as f32 * self.spread
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Sets the iteration count, clamped to `0..=MAX_GLOW_RADIUS`.
    pub fn set_radius(&mut self, radius: u32) {
        self.radius = radius.min(MAX_GLOW_RADIUS);
    }

    pub fn set_spread(&mut self, spread: f32) {
        self.spread = spread;
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    pub fn validate(&self) -> Result<()> {
        if self.radius > MAX_GLOW_RADIUS {
            return Err(invalid(
                "glow",
                format!("radius {} exceeds {MAX_GLOW_RADIUS}", self.radius),
            ));
        }
        if !(self.spread.is_finite() && self.spread > 0.0) {
            return Err(invalid("glow", "spread must be positive"));
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(invalid("glow", "threshold must be non-negative"));
        }
        if !(self.intensity.is_finite() && self.intensity >= 0.0) {
            return Err(invalid("glow", "intensity must be non-negative"));
        }
        Ok(())
    }
}
