use glam::{Mat4, Vec3};

/// The viewpoint a frame is rendered from.
///
/// Matrices follow the wgpu clip-space convention (depth in `[0, 1]`).
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// A perspective camera at `position` looking at `target`.
    ///
    /// `fov_y` is in degrees.
    #[must_use]
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y.to_radians(), aspect, near, far),
            near,
            far,
        }
    }

    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Moves the camera, keeping its orientation.
    pub fn set_position(&mut self, position: Vec3) {
        let delta = position - self.position;
        self.view *= Mat4::from_translation(-delta);
        self.position = position;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 60.0, 16.0 / 9.0, 0.1, 100.0)
    }
}
