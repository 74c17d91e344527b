//! Window context consumed by the renderer.

use glam::UVec2;

/// What the renderer reads from the host window each frame.
pub trait WindowContext {
    /// Drawable size in physical pixels.
    fn size(&self) -> UVec2;

    /// Seconds since the previous frame.
    fn delta_time(&self) -> f32;
}

/// A plain [`WindowContext`] value, for hosts that track size and timing
/// themselves (and for tests).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameWindow {
    pub size: UVec2,
    pub delta_time: f32,
}

impl FrameWindow {
    #[must_use]
    pub fn new(size: UVec2, delta_time: f32) -> Self {
        Self { size, delta_time }
    }
}

impl WindowContext for FrameWindow {
    fn size(&self) -> UVec2 {
        self.size
    }

    fn delta_time(&self) -> f32 {
        self.delta_time
    }
}
