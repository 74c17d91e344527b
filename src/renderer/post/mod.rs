//! Post-Processing
//!
//! Image-space passes run after the scene is resolved. Each filter reads one
//! input image and writes one output target; the [`FilterChain`] decides
//! which buffers those are.
//!
//! # Frame order
//!
//! ```text
//! scene color ─┬─► GlowBlur (H ⇄ V, N iterations) ─► glow
//!              │                                     │
//!              └─► HdrPrepass ◄──────────────────────┘
//!                      │
//!                      ▼
//!                    Hdr (exposure, tone map, motion blur)
//!                      │
//!                      ▼
//!                    Fxaa ─► Lens ─► [custom stages] ─► Finalizer ─► screen
//! ```
//!
//! Everything a filter may need besides its input (G-buffer channels, the
//! glow result, timing) arrives in [`FrameInputs`].

mod blur;
mod chain;
pub mod exposure;
mod finalizer;
mod fxaa;
mod hdr;
mod hdr_prepass;
mod lens;

pub use blur::{BlurFilter, BlurStage, GlowBlur};
pub use chain::{ChainWalk, FilterChain, InputSource, OutputSink, StageId};
pub use finalizer::FinalizerFilter;
pub use fxaa::FxaaFilter;
pub use hdr::HdrFilter;
pub use hdr_prepass::HdrPrepassFilter;
pub use lens::LensFilter;

use std::any::Any;

use glam::Mat4;

use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::{BlendMode, GraphicsContext, TextureRef};
use crate::renderer::target::RenderTarget;

/// Per-frame images and values shared by every filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    /// Resolved scene color (after the swap).
    pub scene_color: TextureRef,
    /// Blurred glow, when the glow path ran this frame.
    pub glow: Option<TextureRef>,
    /// G-buffer world position.
    pub position: TextureRef,
    /// G-buffer normal and velocity.
    pub normal_velocity: TextureRef,
    pub depth: TextureRef,
    pub previous_view_projection: Mat4,
    pub delta_time: f32,
}

/// What a filter reads and writes for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct FilterIo<'f> {
    pub input: TextureRef,
    /// Already bound, with viewport and scissor covering it.
    pub output: RenderTarget,
    pub frame: &'f FrameInputs,
}

/// An image-space pass.
pub trait PostFilter: Any {
    fn name(&self) -> &str;

    /// Disabled filters are skipped by the chain walk; their wiring is kept.
    fn is_enabled(&self) -> bool;

    /// Draws into the bound output.
    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Binds `output`, sets a pixel-space context and full-target
/// viewport/scissor, applies `filter` and unbinds.
pub(crate) fn run_filter(
    gfx: &mut dyn GraphicsContext,
    filter: &mut dyn PostFilter,
    input: TextureRef,
    output: &RenderTarget,
    frame: &FrameInputs,
) {
    let mut scope = output.bind(gfx);
    let viewport = output.viewport();
    scope.set_viewport(viewport);
    scope.set_scissor(Some(viewport));
    scope.set_depth_test(false);
    scope.set_depth_write(false);
    scope.set_blend(BlendMode::Replace);
    let ctx = RenderingContext::orthographic_2d(output.size());
    let io = FilterIo {
        input,
        output: *output,
        frame,
    };
    log::trace!("Applying '{}'", filter.name());
    filter.apply(&mut *scope, &ctx, &io);
}
