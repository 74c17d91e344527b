//! FXAA (Fast Approximate Anti-Aliasing) Configuration
//!
//! FXAA identifies aliased edges via luma contrast and applies sub-pixel
//! smoothing. It operates on LDR (post-tone-mapped) images and therefore runs
//! **after** the HDR stage in the filter chain.
//!
//! # Quality Presets
//!
//! | Preset   | Iterations | Best for              |
//! |----------|------------|-----------------------|
//! | `Low`    | 4          | Mobile / low-end GPU  |
//! | `Medium` | 8          | Default balance       |
//! | `High`   | 12         | Maximum quality       |

use crate::errors::Result;

use super::invalid;

/// FXAA quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FxaaQuality {
    /// 4 iterations
    Low,
    /// 8 iterations
    #[default]
    Medium,
    /// 12 iterations
    High,
}

impl FxaaQuality {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    #[must_use]
    pub const fn all() -> &'static [FxaaQuality] {
        &[Self::Low, Self::Medium, Self::High]
    }

    /// Edge exploration steps performed by the shader.
    #[must_use]
    pub const fn iterations(self) -> u32 {
        match self {
            Self::Low => 4,
            Self::Medium => 8,
            Self::High => 12,
        }
    }
}

/// Anti-aliasing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AntiAliasingSettings {
    /// Whether the FXAA stage runs.
    pub enabled: bool,

    quality: FxaaQuality,

    /// Amount of sub-pixel aliasing removal, in `[0, 1]`.
    ///
    /// Default: `0.75`
    subpixel: f32,

    /// Minimum local contrast required to treat a pixel as an edge.
    ///
    /// Default: `0.166`
    edge_threshold: f32,
}

impl Default for AntiAliasingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: FxaaQuality::default(),
            subpixel: 0.75,
            edge_threshold: 0.166,
        }
    }
}

impl AntiAliasingSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn quality(&self) -> FxaaQuality {
        self.quality
    }

    #[inline]
    #[must_use]
    pub fn subpixel(&self) -> f32 {
        self.subpixel
    }

    #[inline]
    #[must_use]
    pub fn edge_threshold(&self) -> f32 {
        self.edge_threshold
    }

    pub fn set_quality(&mut self, quality: FxaaQuality) {
        self.quality = quality;
    }

    pub fn set_subpixel(&mut self, subpixel: f32) {
        self.subpixel = subpixel;
    }

    pub fn set_edge_threshold(&mut self, threshold: f32) {
        self.edge_threshold = threshold;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.subpixel) {
            return Err(invalid("antialiasing", "subpixel must be in [0, 1]"));
        }
        if !(self.edge_threshold > 0.0 && self.edge_threshold <= 1.0) {
            return Err(invalid("antialiasing", "edge threshold must be in (0, 1]"));
        }
        Ok(())
    }
}
