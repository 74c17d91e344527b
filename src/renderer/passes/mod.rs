//! Deferred Lighting Passes
//!
//! Both passes shade from the G-buffer into whatever target is bound by the
//! caller (the scene target, or a cubemap face during capture). They only
//! read the G-buffer; nothing after the pre-step writes to it.
//!
//! - [`DeferredEnvironmentPass`]: ambient, environment reflection and SSAO.
//!   Replaces the color of every covered pixel.
//! - [`DeferredLightPass`]: one additive full-screen draw per light,
//!   scissored to the light's projected bounds.

mod environment;
mod light;

pub use environment::DeferredEnvironmentPass;
pub use light::{DeferredLightPass, LightCoverage, LightPassStats};
