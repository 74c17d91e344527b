//! Exposure, tone mapping and camera motion blur.
//!
//! Motion blur is folded into this stage because it needs the linear HDR
//! image and the G-buffer, both of which the stage already samples. With HDR
//! disabled the stage still runs for motion blur, at exposure `1` and the
//! linear operator.

use std::any::Any;

use glam::Mat4;

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::GraphicsContext;
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::resources::{HdrSettings, MotionBlurSettings, ToneMappingMode};

use super::exposure;
use super::{FilterIo, PostFilter};

pub const PROGRAM: &str = "hdr";

#[derive(Debug)]
pub struct HdrFilter {
    shader: ShaderProgram,
    hdr: HdrSettings,
    motion_blur: MotionBlurSettings,
}

impl HdrFilter {
    pub fn new(
        gfx: &mut dyn GraphicsContext,
        hdr: HdrSettings,
        motion_blur: MotionBlurSettings,
    ) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("previous_view_projection", Mat4::IDENTITY)
            .with("exposure", 1.0)
            .with("tone_mapping", 0.0)
            .with("motion_blur_strength", 0.0)
            .with("motion_blur_samples", 1.0);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            hdr,
            motion_blur,
        })
    }

    #[inline]
    #[must_use]
    pub fn hdr(&self) -> &HdrSettings {
        &self.hdr
    }

    #[inline]
    #[must_use]
    pub fn motion_blur(&self) -> &MotionBlurSettings {
        &self.motion_blur
    }

    /// Replaces the HDR group. Its exposure becomes the controller state, so
    /// a copy taken from [`hdr`](Self::hdr) continues where adaptation was.
    pub fn set_hdr(&mut self, hdr: HdrSettings) {
        self.hdr = hdr;
    }

    pub fn set_motion_blur(&mut self, motion_blur: MotionBlurSettings) {
        self.motion_blur = motion_blur;
    }

    /// Whether the renderer should measure scene luminance this frame.
    #[must_use]
    pub fn wants_luminance(&self) -> bool {
        self.hdr.enabled && self.hdr.auto_exposure
    }

    /// Moves the exposure toward the target for `luminance`. Invalid
    /// readings are ignored. Returns the exposure in effect afterwards.
    pub fn adapt_exposure(&mut self, luminance: f32, delta_time: f32) -> f32 {
        match exposure::adapt(&self.hdr, luminance, delta_time) {
            Some(next) => self.hdr.set_exposure(next),
            None => log::debug!("Ignoring luminance reading {luminance}"),
        }
        self.hdr.exposure()
    }
}

impl PostFilter for HdrFilter {
    fn name(&self) -> &str {
        "HDR"
    }

    fn is_enabled(&self) -> bool {
        self.hdr.enabled || self.motion_blur.enabled
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        let (exposure, operator) = if self.hdr.enabled {
            (self.hdr.exposure(), self.hdr.mode)
        } else {
            (1.0, ToneMappingMode::Linear)
        };
        let strength = if self.motion_blur.enabled {
            self.motion_blur.strength
        } else {
            0.0
        };

        let params = self.shader.parameters_mut();
        params.set("previous_view_projection", io.frame.previous_view_projection);
        params.set("exposure", exposure);
        params.set("tone_mapping", operator.shader_index());
        params.set("motion_blur_strength", strength);
        params.set("motion_blur_samples", self.motion_blur.samples as f32);

        let mut program = self.shader.bind(gfx, ctx);
        program.bind_texture(0, io.input);
        program.bind_texture(1, io.frame.position);
        program.bind_texture(2, io.frame.normal_velocity);
        program.draw_fullscreen();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
