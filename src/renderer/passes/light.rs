use glam::{Vec2, Vec3, Vec4Swizzles};

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gbuffer::GBuffer;
use crate::renderer::gpu::{BlendMode, GraphicsContext, Rect};
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::scene::{Light, LightKind};

pub const PROGRAM: &str = "deferred_light";

/// Screen area a light can affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCoverage {
    /// Unbounded, or the camera is inside or behind the light's bounds.
    FullScreen,
    /// Scissor rectangle in viewport pixels.
    Rect(Rect),
    /// Entirely outside the view.
    Offscreen,
}

impl LightCoverage {
    /// Projects the corners of the bounding box of the light's bounding
    /// sphere and takes their screen-space extent.
    #[must_use]
    pub fn of(light: &Light, ctx: &RenderingContext) -> Self {
        let Some((center, radius)) = light.bounding_sphere() else {
            return Self::FullScreen;
        };
        if center.distance(ctx.camera_position) <= radius {
            return Self::FullScreen;
        }

        let viewport = ctx.viewport_size();
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        let mut beyond_far = true;
        for i in 0..8u32 {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            let clip = ctx.view_projection * (center + sign * radius).extend(1.0);
            if clip.w <= f32::EPSILON {
                // A corner behind the eye projects through infinity.
                return Self::FullScreen;
            }
            let ndc = clip.xyz() / clip.w;
            beyond_far &= ndc.z > 1.0;
            let px = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) * viewport;
            min = min.min(px);
            max = max.max(px);
        }
        if beyond_far {
            return Self::Offscreen;
        }

        let min = min.clamp(Vec2::ZERO, viewport).floor();
        let max = max.clamp(Vec2::ZERO, viewport).ceil();
        if max.x <= min.x || max.y <= min.y {
            return Self::Offscreen;
        }
        Self::Rect(Rect::new(
            min.x as u32,
            min.y as u32,
            (max.x - min.x) as u32,
            (max.y - min.y) as u32,
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightPassStats {
    pub drawn: u32,
    pub culled: u32,
}

/// Accumulates every light of the scene additively.
#[derive(Debug)]
pub struct DeferredLightPass {
    shader: ShaderProgram,
}

impl DeferredLightPass {
    pub fn new(gfx: &mut dyn GraphicsContext) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("light_type", 0.0)
            .with("light_color", Vec3::ONE)
            .with("light_intensity", 1.0)
            .with("light_position", Vec3::ZERO)
            .with("light_range", 0.0)
            .with("light_direction", Vec3::NEG_Y)
            .with("inner_cone_cos", 1.0)
            .with("outer_cone_cos", 1.0)
            .with("has_shadow", 0.0)
            .with("shadow_bias", 0.0)
            .with("shadow_view_projection", glam::Mat4::IDENTITY);
        Ok(Self {
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
        })
    }

    fn set_light(&mut self, light: &Light) {
        let params = self.shader.parameters_mut();
        params.set("light_color", light.color);
        params.set("light_intensity", light.intensity);
        match &light.kind {
            LightKind::Directional(d) => {
                params.set("light_type", 0.0);
                params.set("light_direction", d.direction);
            }
            LightKind::Point(p) => {
                params.set("light_type", 1.0);
                params.set("light_position", p.position);
                params.set("light_range", p.range);
            }
            LightKind::Spot(s) => {
                params.set("light_type", 2.0);
                params.set("light_position", s.position);
                params.set("light_direction", s.direction);
                params.set("light_range", s.range);
                params.set("inner_cone_cos", s.inner_cone.cos());
                params.set("outer_cone_cos", s.outer_cone.cos());
            }
        }
        let shadow = light.casts_shadow();
        params.set("has_shadow", if shadow { 1.0 } else { 0.0 });
        params.set("shadow_bias", light.shadow.as_ref().map_or(0.0, |s| s.bias));
        params.set("shadow_view_projection", light.shadow_view_projection);
    }

    /// Draws every visible light into the currently bound target.
    pub fn render(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        ctx: &RenderingContext,
        gbuffer: &GBuffer,
        lights: &[Light],
    ) -> LightPassStats {
        let mut stats = LightPassStats::default();
        gfx.set_depth_test(false);
        gfx.set_depth_write(false);
        gfx.set_blend(BlendMode::Additive);

        for light in lights {
            let scissor = match LightCoverage::of(light, ctx) {
                LightCoverage::Offscreen => {
                    stats.culled += 1;
                    continue;
                }
                LightCoverage::FullScreen => None,
                LightCoverage::Rect(rect) => Some(rect),
            };
            self.set_light(light);

            let mut program = self.shader.bind(gfx, ctx);
            program.set_scissor(scissor);
            program.bind_texture(0, gbuffer.position());
            program.bind_texture(1, gbuffer.normal_velocity());
            program.bind_texture(2, gbuffer.albedo());
            program.bind_texture(3, gbuffer.depth());
            if light.casts_shadow()
                && let Some(map) = light.shadow_map
            {
                program.bind_texture(4, map);
            }
            program.draw_fullscreen();
            stats.drawn += 1;
        }

        gfx.set_scissor(None);
        gfx.set_blend(BlendMode::Replace);
        log::trace!("Light pass: {} drawn, {} culled", stats.drawn, stats.culled);
        stats
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, UVec2};

    use super::*;

    fn context() -> RenderingContext {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        RenderingContext::new(view, projection, Vec3::new(0.0, 0.0, 10.0), UVec2::new(512, 512))
    }

    #[test]
    fn centered_light_gets_a_centered_scissor() {
        let light = Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 1.0);
        let LightCoverage::Rect(rect) = LightCoverage::of(&light, &context()) else {
            panic!("expected a scissor rectangle");
        };
        let center = (rect.x + rect.width / 2, rect.y + rect.height / 2);
        assert!(center.0.abs_diff(256) <= 1 && center.1.abs_diff(256) <= 1);
        assert!(rect.width < 512);
    }

    #[test]
    fn camera_inside_light_covers_the_screen() {
        let light = Light::new_point(Vec3::ONE, 1.0, Vec3::new(0.0, 0.0, 9.0), 5.0);
        assert_eq!(LightCoverage::of(&light, &context()), LightCoverage::FullScreen);
    }

    #[test]
    fn light_off_to_the_side_is_culled() {
        let light = Light::new_point(Vec3::ONE, 1.0, Vec3::new(200.0, 0.0, 0.0), 1.0);
        assert_eq!(LightCoverage::of(&light, &context()), LightCoverage::Offscreen);
    }
}
