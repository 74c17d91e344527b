//! Scene-wide lighting environment.

use glam::{Vec3, Vec4};

use crate::renderer::gpu::CubemapId;

/// Background and image-based lighting inputs of a scene.
///
/// `environment_map` is what the deferred environment pass samples for
/// reflections. It is also what cubemap capture refuses to render into, since
/// that would sample and write the same texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    /// Clear color of the scene target.
    pub background_color: Vec4,
    pub ambient_color: Vec3,
    /// Scale applied to ambient and reflected light.
    pub intensity: f32,
    pub environment_map: Option<CubemapId>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            background_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            ambient_color: Vec3::splat(0.03),
            intensity: 1.0,
            environment_map: None,
        }
    }
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_environment_map(mut self, map: CubemapId) -> Self {
        self.environment_map = Some(map);
        self
    }

    /// Whether the scene samples `cubemap` while rendering.
    #[inline]
    #[must_use]
    pub fn samples_cubemap(&self, cubemap: CubemapId) -> bool {
        self.environment_map == Some(cubemap)
    }
}
