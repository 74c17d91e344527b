//! Per-pass view description.

use glam::{Mat4, UVec2, Vec2, Vec3};

use crate::renderer::gpu::CubeFace;
use crate::scene::Camera;

/// The view a pass renders from: camera matrices, model transform and
/// viewport size.
///
/// Contexts are cheap values. Filters get a fresh orthographic context sized
/// to their output; cubemap capture derives one per face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingContext {
    pub view: Mat4,
    pub projection: Mat4,
    pub model: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    /// View-projection of the previous frame, for velocity reconstruction.
    pub previous_view_projection: Mat4,
    pub camera_position: Vec3,
    pub viewport: UVec2,
    pub near: f32,
    pub far: f32,
}

impl RenderingContext {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3, viewport: UVec2) -> Self {
        let view_projection = projection * view;
        Self {
            view,
            projection,
            model: Mat4::IDENTITY,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            previous_view_projection: view_projection,
            camera_position,
            viewport,
            near: 0.1,
            far: 100.0,
        }
    }

    #[must_use]
    pub fn from_camera(camera: &Camera, viewport: UVec2) -> Self {
        Self::new(camera.view, camera.projection, camera.position, viewport)
            .with_depth_range(camera.near, camera.far)
    }

    /// Pixel-space orthographic context with a top-left origin, as used by
    /// screen-space filters and 2D overlays.
    #[must_use]
    pub fn orthographic_2d(viewport: UVec2) -> Self {
        let size = viewport.max(UVec2::ONE).as_vec2();
        let projection = Mat4::orthographic_rh(0.0, size.x, size.y, 0.0, -1.0, 1.0);
        Self::new(Mat4::IDENTITY, projection, Vec3::ZERO, viewport).with_depth_range(-1.0, 1.0)
    }

    /// 90 degree square view of one cube face from `position`.
    #[must_use]
    pub fn cube_face(position: Vec3, face: CubeFace, size: u32, near: f32, far: f32) -> Self {
        let (forward, up) = face.basis();
        let view = Mat4::look_to_rh(position, forward, up);
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
        Self::new(view, projection, position, UVec2::splat(size)).with_depth_range(near, far)
    }

    #[must_use]
    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_previous_view_projection(mut self, previous: Mat4) -> Self {
        self.previous_view_projection = previous;
        self
    }

    #[must_use]
    pub fn with_depth_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    #[inline]
    #[must_use]
    pub fn viewport_size(&self) -> Vec2 {
        self.viewport.as_vec2()
    }

    #[inline]
    #[must_use]
    pub fn inverse_viewport_size(&self) -> Vec2 {
        Vec2::ONE / self.viewport.max(UVec2::ONE).as_vec2()
    }
}
