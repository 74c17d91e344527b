//! Last pass of the frame: vignette and LUT grading, written to the screen.
//!
//! The finalizer is not part of the [`FilterChain`](super::FilterChain). It
//! always runs and reads whatever the chain produced last, so a frame with
//! every optional stage disabled still reaches the screen.

use std::any::Any;

use glam::Vec4;

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::{GraphicsContext, TextureRef};
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::resources::{LutSettings, VignetteSettings};

use super::{FilterIo, PostFilter};

pub const PROGRAM: &str = "finalizer";

#[derive(Debug)]
pub struct FinalizerFilter {
    shader: ShaderProgram,
    vignette: VignetteSettings,
    lut: LutSettings,
}

impl FinalizerFilter {
    pub fn new(
        gfx: &mut dyn GraphicsContext,
        vignette: VignetteSettings,
        lut: LutSettings,
    ) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("vignette_color", Vec4::W)
            .with("vignette_intensity", 0.0)
            .with("vignette_smoothness", 0.5)
            .with("lut_contribution", 0.0)
            .with("has_lut", 0.0);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            vignette,
            lut,
        })
    }

    #[inline]
    #[must_use]
    pub fn vignette(&self) -> &VignetteSettings {
        &self.vignette
    }

    #[inline]
    #[must_use]
    pub fn lut(&self) -> &LutSettings {
        &self.lut
    }

    pub fn set_vignette(&mut self, vignette: VignetteSettings) {
        self.vignette = vignette;
    }

    pub fn set_lut(&mut self, lut: LutSettings) {
        self.lut = lut;
    }
}

impl PostFilter for FinalizerFilter {
    fn name(&self) -> &str {
        "Finalizer"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        let lut = self.lut.texture();
        let params = self.shader.parameters_mut();
        params.set("vignette_color", self.vignette.color);
        params.set("vignette_intensity", self.vignette.effective_intensity());
        params.set("vignette_smoothness", self.vignette.smoothness);
        params.set("lut_contribution", self.lut.contribution());
        params.set("has_lut", if lut.is_some() { 1.0 } else { 0.0 });

        let mut program = self.shader.bind(gfx, ctx);
        program.bind_texture(0, io.input);
        if let Some(texture) = lut {
            program.bind_texture(1, TextureRef::External(texture));
        }
        program.draw_fullscreen();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
