use std::any::Any;

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::GraphicsContext;
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::resources::LensSettings;

use super::{FilterIo, PostFilter};

pub const PROGRAM: &str = "lens";

/// Radial lens distortion with chromatic dispersion.
#[derive(Debug)]
pub struct LensFilter {
    shader: ShaderProgram,
    settings: LensSettings,
}

impl LensFilter {
    pub fn new(gfx: &mut dyn GraphicsContext, settings: LensSettings) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("distortion", settings.distortion)
            .with("cubic_distortion", settings.cubic_distortion)
            .with("dispersion", settings.dispersion)
            .with("scale", settings.scale);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            settings,
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &LensSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: LensSettings) {
        self.settings = settings;
    }
}

impl PostFilter for LensFilter {
    fn name(&self) -> &str {
        "Lens"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        let params = self.shader.parameters_mut();
        params.set("distortion", self.settings.distortion);
        params.set("cubic_distortion", self.settings.cubic_distortion);
        params.set("dispersion", self.settings.dispersion);
        params.set("scale", self.settings.scale);

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
