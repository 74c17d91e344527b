//! Post-processing and lighting settings.
//!
//! Each settings group is pure data: no GPU objects, no shader handles. The
//! filters that consume them read the values at apply time, so changing a
//! setting takes effect on the next frame without any re-wiring.
//!
//! Groups are replaced wholesale through
//! [`Renderer::configure`](crate::renderer::Renderer::configure), which runs
//! each group's `validate()` before forwarding it.

pub mod antialiasing;
pub mod glow;
pub mod hdr;
pub mod lens;
pub mod lut;
pub mod motion_blur;
pub mod ssao;
pub mod vignette;

pub use antialiasing::{AntiAliasingSettings, FxaaQuality};
pub use glow::GlowSettings;
pub use hdr::{HdrSettings, ToneMappingMode};
pub use lens::LensSettings;
pub use lut::LutSettings;
pub use motion_blur::MotionBlurSettings;
pub use ssao::SsaoSettings;
pub use vignette::VignetteSettings;

use crate::errors::GloamError;

/// Shorthand for building an [`GloamError::InvalidSetting`].
pub(crate) fn invalid(group: &'static str, reason: impl Into<String>) -> GloamError {
    GloamError::InvalidSetting {
        group,
        reason: reason.into(),
    }
}
