//! Renderer Settings & Runtime Options
//!
//! Two kinds of configuration reach the renderer:
//!
//! - [`RendererSettings`]: fixed at construction. Formats, buffer scales and
//!   the cubemap capture parameters. Changing them means building a new
//!   [`Renderer`](super::Renderer).
//! - [`RenderOption`]: one tunable settings group, applied at runtime through
//!   [`Renderer::configure`](super::Renderer::configure). Each group is
//!   validated before it replaces the one owned by its filter or pass.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gloam::{Renderer, RendererSettings, RenderOption};
//! use gloam::resources::GlowSettings;
//!
//! let mut renderer = Renderer::new(&mut gfx, &window, RendererSettings::default())?;
//!
//! let mut glow = renderer.glow().clone();
//! glow.set_radius(6);
//! renderer.configure(RenderOption::Glow(glow))?;
//! ```

use crate::errors::Result;
use crate::renderer::gpu::ColorFormat;
use crate::resources::{
    AntiAliasingSettings, GlowSettings, HdrSettings, LensSettings, LutSettings,
    MotionBlurSettings, SsaoSettings, VignetteSettings, invalid,
};

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Construction-time configuration of a [`Renderer`](super::Renderer).
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Format of the scene target and of every post-filter buffer.
    ///
    /// Must be `Rgba16Float` or `Rgba32Float`: the luminance mip chain and
    /// the glow threshold operate on unclamped HDR colors.
    ///
    /// Default: [`ColorFormat::Rgba16Float`]
    pub hdr_format: ColorFormat,

    /// Divisor applied to the window size for the glow ping-pong buffers.
    ///
    /// Default: `2` (half resolution)
    pub glow_downscale: u32,

    /// Near plane of cubemap face projections.
    pub cubemap_near: f32,

    /// Far plane of cubemap face projections.
    pub cubemap_far: f32,

    /// Simulation step (seconds) peeked before a cubemap capture so dynamic
    /// objects appear where the next frame will show them.
    ///
    /// Default: `1/60`
    pub capture_step: f32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            hdr_format: ColorFormat::Rgba16Float,
            glow_downscale: 2,
            cubemap_near: 0.1,
            cubemap_far: 100.0,
            capture_step: 1.0 / 60.0,
        }
    }
}

impl RendererSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.hdr_format.is_hdr_color() {
            return Err(invalid(
                "renderer",
                format!("scene format {:?} is not an RGBA float format", self.hdr_format),
            ));
        }
        if self.glow_downscale == 0 {
            return Err(invalid("renderer", "glow downscale must be at least 1"));
        }
        if !(self.cubemap_near > 0.0 && self.cubemap_far > self.cubemap_near) {
            return Err(invalid(
                "renderer",
                format!(
                    "cubemap depth range [{}, {}] is empty",
                    self.cubemap_near, self.cubemap_far
                ),
            ));
        }
        if !(self.capture_step.is_finite() && self.capture_step >= 0.0) {
            return Err(invalid("renderer", "capture step must be non-negative"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RenderOption
// ---------------------------------------------------------------------------

/// A settings group for [`Renderer::configure`](super::Renderer::configure).
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOption {
    Ssao(SsaoSettings),
    Hdr(HdrSettings),
    Glow(GlowSettings),
    MotionBlur(MotionBlurSettings),
    Lut(LutSettings),
    Vignette(VignetteSettings),
    AntiAliasing(AntiAliasingSettings),
    Lens(LensSettings),
}

impl RenderOption {
    /// Name of the settings group, as used in log messages and errors.
    #[must_use]
    pub const fn group(&self) -> &'static str {
        match self {
            Self::Ssao(_) => "ssao",
            Self::Hdr(_) => "hdr",
            Self::Glow(_) => "glow",
            Self::MotionBlur(_) => "motion blur",
            Self::Lut(_) => "lut",
            Self::Vignette(_) => "vignette",
            Self::AntiAliasing(_) => "antialiasing",
            Self::Lens(_) => "lens",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Ssao(s) => s.validate(),
            Self::Hdr(s) => s.validate(),
            Self::Glow(s) => s.validate(),
            Self::MotionBlur(s) => s.validate(),
            Self::Lut(s) => s.validate(),
            Self::Vignette(s) => s.validate(),
            Self::AntiAliasing(s) => s.validate(),
            Self::Lens(s) => s.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(RendererSettings::default().validate().is_ok());
    }

    #[test]
    fn unorm_scene_format_is_rejected() {
        let settings = RendererSettings {
            hdr_format: ColorFormat::Rgba8Unorm,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
