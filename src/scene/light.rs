use glam::{Mat4, Vec3};

use crate::renderer::gpu::TextureRef;

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    pub bias: f32,
    pub normal_bias: f32,
    pub map_size: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            bias: 0.005,
            normal_bias: 0.02,
            map_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub range: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    pub inner_cone: f32,
    pub outer_cone: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

/// A light as seen by the deferred light pass.
///
/// The shadow map, when present, is produced by the scene's
/// [`LightManager`](super::LightManager) during the pre-step.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
    pub shadow: Option<ShadowConfig>,
    pub shadow_map: Option<TextureRef>,
    /// World to shadow-map clip space, maintained by the light manager.
    pub shadow_view_projection: Mat4,
}

impl Light {
    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32, direction: Vec3) -> Self {
        Self {
            color,
            intensity,
            kind: LightKind::Directional(DirectionalLight {
                direction: direction.normalize_or(Vec3::NEG_Y),
            }),
            shadow: None,
            shadow_map: None,
            shadow_view_projection: Mat4::IDENTITY,
        }
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, position: Vec3, range: f32) -> Self {
        Self {
            color,
            intensity,
            kind: LightKind::Point(PointLight { position, range }),
            shadow: None,
            shadow_map: None,
            shadow_view_projection: Mat4::IDENTITY,
        }
    }

    #[must_use]
    pub fn new_spot(
        color: Vec3,
        intensity: f32,
        position: Vec3,
        direction: Vec3,
        range: f32,
        inner_cone: f32,
        outer_cone: f32,
    ) -> Self {
        Self {
            color,
            intensity,
            kind: LightKind::Spot(SpotLight {
                position,
                direction: direction.normalize_or(Vec3::NEG_Y),
                range,
                inner_cone,
                outer_cone,
            }),
            shadow: None,
            shadow_map: None,
            shadow_view_projection: Mat4::IDENTITY,
        }
    }

    #[must_use]
    pub fn with_shadow(mut self, config: ShadowConfig) -> Self {
        self.shadow = Some(config);
        self
    }

    /// Whether the light pass can sample a shadow map for this light.
    #[inline]
    #[must_use]
    pub fn casts_shadow(&self) -> bool {
        self.shadow.is_some() && self.shadow_map.is_some()
    }

    /// World-space bounding sphere, `None` for lights without a finite range.
    #[must_use]
    pub fn bounding_sphere(&self) -> Option<(Vec3, f32)> {
        match &self.kind {
            LightKind::Directional(_) => None,
            LightKind::Point(p) => Some((p.position, p.range)),
            LightKind::Spot(s) => Some((s.position, s.range)),
        }
    }
}
