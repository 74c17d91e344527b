//! Color Grading (LUT)
//!
//! A lookup texture applied by the finalizer. The texture is an unwrapped
//! 3D LUT (slices laid side by side) created by the host and handed over by id.

use crate::errors::Result;
use crate::renderer::gpu::TextureId;

use super::invalid;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LutSettings {
    texture: Option<TextureId>,
    contribution: f32,
}

impl LutSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grading with `texture` at full contribution.
    #[must_use]
    pub fn with_texture(texture: TextureId) -> Self {
        Self {
            texture: Some(texture),
            contribution: 1.0,
        }
    }

    /// Grading is active whenever a texture is set.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.texture.is_some()
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    #[inline]
    #[must_use]
    pub fn contribution(&self) -> f32 {
        self.contribution
    }

    pub fn set_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
    }

    /// Blend factor between the graded and ungraded color.
    pub fn set_contribution(&mut self, contribution: f32) {
        self.contribution = contribution;
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.contribution) {
            return Err(invalid(
                "lut",
                format!("contribution must be in [0, 1], got {}", self.contribution),
            ));
        }
        Ok(())
    }
}
