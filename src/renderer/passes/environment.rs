use glam::Vec3;

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gbuffer::GBuffer;
use crate::renderer::gpu::{BlendMode, GraphicsContext, TextureRef};
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::resources::SsaoSettings;
use crate::scene::Environment;

pub const PROGRAM: &str = "deferred_environment";

/// Resolves ambient light, environment reflections and SSAO.
#[derive(Debug)]
pub struct DeferredEnvironmentPass {
    shader: ShaderProgram,
    ssao: SsaoSettings,
}

impl DeferredEnvironmentPass {
    pub fn new(gfx: &mut dyn GraphicsContext) -> Result<Self> {
        let ssao = SsaoSettings::default();
        let parameters = ShaderParameters::new()
            .with("ambient_intensity", 1.0)
            .with("ambient_color", Vec3::ZERO)
            .with("has_environment_map", 0.0)
            .with("ssao_enabled", 0.0)
            .with("ssao_radius", ssao.radius())
            .with("ssao_bias", ssao.bias())
            .with("ssao_intensity", ssao.intensity())
            .with("ssao_samples", ssao.sample_count() as f32);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            ssao,
        })
    }

    #[inline]
    #[must_use]
    pub fn ssao(&self) -> &SsaoSettings {
        &self.ssao
    }

    /// Replaces the SSAO settings. Callers validate first.
    pub fn set_ssao(&mut self, ssao: SsaoSettings) {
        self.ssao = ssao;
    }

    /// Draws into the currently bound target.
    pub fn render(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        ctx: &RenderingContext,
        gbuffer: &GBuffer,
        environment: &Environment,
    ) {
        let params = self.shader.parameters_mut();
        params.set("ambient_intensity", environment.intensity);
        params.set("ambient_color", environment.ambient_color);
        params.set(
            "has_environment_map",
            if environment.environment_map.is_some() { 1.0 } else { 0.0 },
        );
        params.set("ssao_enabled", if self.ssao.enabled { 1.0 } else { 0.0 });
        params.set("ssao_radius", self.ssao.radius());
        params.set("ssao_bias", self.ssao.bias());
        params.set("ssao_intensity", self.ssao.intensity());
        params.set("ssao_samples", self.ssao.sample_count() as f32);

        gfx.set_depth_test(false);
        gfx.set_depth_write(false);
        gfx.set_blend(BlendMode::Replace);

        let mut program = self.shader.bind(gfx, ctx);
        program.bind_texture(0, gbuffer.position());
        program.bind_texture(1, gbuffer.normal_velocity());
        program.bind_texture(2, gbuffer.albedo());
        program.bind_texture(3, gbuffer.depth());
        if let Some(map) = environment.environment_map {
            program.bind_texture(4, TextureRef::Cubemap(map));
        }
        program.draw_fullscreen();
    }
}
