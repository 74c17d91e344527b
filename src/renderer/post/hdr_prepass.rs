//! Glow composite.
//!
//! Adds the blurred glow back onto the resolved scene before tone mapping.
//! The stage is enabled with the glow group; when the glow path ran zero
//! iterations the shader copies the scene through.

use std::any::Any;

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::GraphicsContext;
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::resources::GlowSettings;

use super::{FilterIo, PostFilter};

pub const PROGRAM: &str = "hdr_prepass";

#[derive(Debug)]
pub struct HdrPrepassFilter {
    shader: ShaderProgram,
    glow: GlowSettings,
}

impl HdrPrepassFilter {
    pub fn new(gfx: &mut dyn GraphicsContext, glow: GlowSettings) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("glow_intensity", glow.intensity())
            .with("has_glow", 0.0);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            glow,
        })
    }

    #[inline]
    #[must_use]
    pub fn glow(&self) -> &GlowSettings {
        &self.glow
    }

    pub fn set_glow(&mut self, glow: GlowSettings) {
        self.glow = glow;
    }
}

impl PostFilter for HdrPrepassFilter {
    fn name(&self) -> &str {
        "HDR Prepass"
    }

    fn is_enabled(&self) -> bool {
        self.glow.enabled
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        let params = self.shader.parameters_mut();
        params.set("glow_intensity", self.glow.intensity());
        params.set("has_glow", if io.frame.glow.is_some() { 1.0 } else { 0.0 });

        let mut program = self.shader.bind(gfx, ctx);
        program.bind_texture(0, io.input);
        if let Some(glow) = io.frame.glow {
            program.bind_texture(1, glow);
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
