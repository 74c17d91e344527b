//! SSAO (Screen Space Ambient Occlusion) Configuration
//!
//! Ambient occlusion is evaluated inside the deferred environment pass, which
//! reads position and normal straight from the G-buffer. These settings are
//! uploaded as plain uniforms every time that pass runs.

use crate::errors::Result;

use super::invalid;

/// Upper bound on the hemisphere kernel size.
pub const MAX_SSAO_SAMPLES: u32 = 64;

/// SSAO configuration.
///
/// # Usage
///
/// ```rust,ignore
/// let mut ssao = SsaoSettings::new();
/// ssao.set_radius(0.75);
/// renderer.configure(RenderOption::Ssao(ssao))?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SsaoSettings {
    /// Whether SSAO darkens the ambient term.
    pub enabled: bool,

    /// Sampling hemisphere radius in world units.
    ///
    /// Default: `0.5`
    radius: f32,

    /// Depth bias to avoid self-occlusion acne.
    ///
    /// Default: `0.025`
    bias: f32,

    /// Occlusion strength multiplier.
    ///
    /// Default: `1.0`
    intensity: f32,

    /// Number of kernel samples per pixel.
    ///
    /// Default: `16`
    sample_count: u32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
            sample_count: 16,
        }
    }
}

impl SsaoSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    #[must_use]
    pub fn bias(&self) -> f32 {
        self.bias
    }

    #[inline]
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    #[inline]
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.bias = bias;
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    /// Sets the kernel size, clamped to `1..=MAX_SSAO_SAMPLES`.
    pub fn set_sample_count(&mut self, count: u32) {
        self.sample_count = count.clamp(1, MAX_SSAO_SAMPLES);
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(invalid("ssao", format!("radius must be positive, got {}", self.radius)));
        }
        if !(self.bias.is_finite() && self.bias >= 0.0) {
            return Err(invalid("ssao", format!("bias must be non-negative, got {}", self.bias)));
        }
        if !(self.intensity.is_finite() && self.intensity >= 0.0) {
            return Err(invalid("ssao", "intensity must be non-negative"));
        }
        if self.sample_count == 0 || self.sample_count > MAX_SSAO_SAMPLES {
            return Err(invalid(
                "ssao",
                format!("sample count must be in 1..={MAX_SSAO_SAMPLES}"),
            ));
        }
        Ok(())
    }
}
