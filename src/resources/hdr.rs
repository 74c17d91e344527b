//! HDR Tone Mapping & Exposure Configuration
//!
//! This module defines tone mapping modes and the exposure controller settings
//! as pure data. Exposure is either fixed or driven by the scene's average
//! luminance (auto-exposure); in the latter case [`HdrSettings::exposure`] is
//! the controller's current state and evolves frame to frame.
//!
//! # Auto-exposure
//!
//! Each frame the average luminance `L` of the resolved scene is read back and
//! the exposure moves toward `key_value / clamp(L, min_luminance, max_luminance)`
//! with an exponential approach governed by `adaptation_speed`.

use crate::errors::Result;

use super::invalid;

/// Tone mapping algorithm selection.
///
/// - [`Linear`](ToneMappingMode::Linear): No tone mapping (for debugging)
/// - [`Reinhard`](ToneMappingMode::Reinhard): Classic operator, soft highlight rolloff
/// - [`ACESFilmic`](ToneMappingMode::ACESFilmic): Industry standard filmic curve
/// - [`Neutral`](ToneMappingMode::Neutral): Balanced, film-like response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToneMappingMode {
    /// No tone mapping (linear passthrough)
    Linear,
    /// Reinhard operator
    Reinhard,
    /// ACES Filmic
    #[default]
    ACESFilmic,
    /// Neutral tone mapping
    Neutral,
}

impl ToneMappingMode {
    /// Returns a human-readable name for the mode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Reinhard => "Reinhard",
            Self::ACESFilmic => "ACES Filmic",
            Self::Neutral => "Neutral",
        }
    }

    /// Returns all available tone mapping modes.
    #[must_use]
    pub const fn all() -> &'static [ToneMappingMode] {
        &[Self::Linear, Self::Reinhard, Self::ACESFilmic, Self::Neutral]
    }

    /// Operator index as seen by the tone mapping shader.
    #[must_use]
    pub(crate) const fn shader_index(self) -> f32 {
        match self {
            Self::Linear => 0.0,
            Self::Reinhard => 1.0,
            Self::ACESFilmic => 2.0,
            Self::Neutral => 3.0,
        }
    }
}

/// HDR configuration.
///
/// # Usage
///
/// ```rust,ignore
/// let mut hdr = renderer.hdr().clone();
/// hdr.auto_exposure = true;
/// hdr.set_key_value(0.18);
/// renderer.configure(RenderOption::Hdr(hdr))?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HdrSettings {
    /// Whether the tone mapping stage runs. When disabled the chain passes
    /// the HDR image through untouched.
    pub enabled: bool,

    pub mode: ToneMappingMode,

    /// Whether exposure adapts to the measured scene luminance.
    pub auto_exposure: bool,

    /// Current exposure multiplier.
    ///
    /// Default: `1.0`
    exposure: f32,

    /// Middle-grey target of the exposure controller.
    ///
    /// Default: `0.18`
    key_value: f32,

    /// Lower clamp on the measured luminance.
    ///
    /// Default: `0.03`
    min_luminance: f32,

    /// Upper clamp on the measured luminance.
    ///
    /// Default: `8.0`
    max_luminance: f32,

    /// Adaptation rate, in 1/seconds.
    ///
    /// Default: `1.5`
    adaptation_speed: f32,
}

impl Default for HdrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ToneMappingMode::default(),
            auto_exposure: true,
            exposure: 1.0,
            key_value: 0.18,
            min_luminance: 0.03,
            max_luminance: 8.0,
            adaptation_speed: 1.5,
        }
    }
}

impl HdrSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    #[inline]
    #[must_use]
    pub fn key_value(&self) -> f32 {
        self.key_value
    }

    #[inline]
    #[must_use]
    pub fn min_luminance(&self) -> f32 {
        self.min_luminance
    }

    #[inline]
    #[must_use]
    pub fn max_luminance(&self) -> f32 {
        self.max_luminance
    }

    #[inline]
    #[must_use]
    pub fn adaptation_speed(&self) -> f32 {
        self.adaptation_speed
    }

    /// Sets the exposure. With auto-exposure enabled this is only the starting
    /// point of the controller.
    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure;
    }

    pub fn set_key_value(&mut self, key: f32) {
        self.key_value = key;
    }

    /// Sets the luminance clamp range used by the controller.
    pub fn set_luminance_range(&mut self, min: f32, max: f32) {
        self.min_luminance = min;
        self.max_luminance = max;
    }

    pub fn set_adaptation_speed(&mut self, speed: f32) {
        self.adaptation_speed = speed;
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            return Err(invalid("hdr", format!("exposure must be positive, got {}", self.exposure)));
        }
        if !(self.key_value.is_finite() && self.key_value > 0.0) {
            return Err(invalid("hdr", "key value must be positive"));
        }
        if !(self.min_luminance.is_finite() && self.min_luminance > 0.0) {
            return Err(invalid("hdr", "minimum luminance must be positive"));
        }
        if !(self.max_luminance.is_finite() && self.max_luminance >= self.min_luminance) {
            return Err(invalid(
                "hdr",
                format!(
                    "luminance range is empty: [{}, {}]",
                    self.min_luminance, self.max_luminance
                ),
            ));
        }
        if !(self.adaptation_speed.is_finite() && self.adaptation_speed >= 0.0) {
            return Err(invalid("hdr", "adaptation speed must be non-negative"));
        }
        Ok(())
    }
}
