#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # gloam
//!
//! The frame-composition half of a deferred renderer: G-buffer fill, shadow and
//! decal pre-step, deferred environment and light resolve, auto-exposure,
//! iterative glow blur, a configurable post-filter chain and the final
//! composite, plus six-face cubemap capture for reflection probes.
//!
//! Every GPU call goes through an explicit [`GraphicsContext`] handle. Two
//! backends ship with the crate: [`WgpuGraphics`] for real hardware and
//! [`HeadlessContext`], a validating command recorder used by the tests.

pub mod errors;
pub mod resources;
pub mod scene;
pub mod renderer;

pub use errors::{GloamError, Result};
pub use renderer::gpu::headless::HeadlessContext;
pub use renderer::gpu::wgpu_backend::WgpuGraphics;
pub use renderer::gpu::{GraphicsContext, TextureRef};
pub use renderer::settings::{RenderOption, RendererSettings};
pub use renderer::{CubemapCapture, FrameStats, Renderer};
pub use scene::{Camera, Environment, Scene};
