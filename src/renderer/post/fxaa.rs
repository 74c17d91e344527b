use std::any::Any;

use glam::Vec2;

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::GraphicsContext;
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::resources::AntiAliasingSettings;

use super::{FilterIo, PostFilter};

pub const PROGRAM: &str = "fxaa";

/// Edge anti-aliasing on the tone-mapped image.
#[derive(Debug)]
pub struct FxaaFilter {
    shader: ShaderProgram,
    settings: AntiAliasingSettings,
}

impl FxaaFilter {
    pub fn new(gfx: &mut dyn GraphicsContext, settings: AntiAliasingSettings) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("inverse_resolution", Vec2::ONE)
            .with("subpixel", settings.subpixel())
            .with("edge_threshold", settings.edge_threshold())
            .with("iterations", settings.quality().iterations() as f32);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            settings,
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &AntiAliasingSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: AntiAliasingSettings) {
        self.settings = settings;
    }
}

impl PostFilter for FxaaFilter {
    fn name(&self) -> &str {
        "FXAA"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        let params = self.shader.parameters_mut();
        params.set("inverse_resolution", ctx.inverse_viewport_size());
        params.set("subpixel", self.settings.subpixel());
        params.set("edge_threshold", self.settings.edge_threshold());
        params.set("iterations", self.settings.quality().iterations() as f32);

        let mut program = self.shader.bind(gfx, ctx);
        program.bind_texture(0, io.input);
        program.draw_fullscreen();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
