//! Render Targets
//!
//! [`RenderTarget`] is a cheap, copyable handle to a framebuffer owned by the
//! graphics context, remembering its size and whether attachment 0 is
//! double-buffered.
//!
//! # Double buffering
//!
//! A double-buffered target has two physical images for attachment 0. Draws
//! write the *front* image; [`color`](RenderTarget::color) samples the *back*
//! image. [`swap`](RenderTarget::swap) exchanges the roles without copying, so
//! right after a swap `color()` is what was just rendered and
//! [`history`](RenderTarget::history) is the previous frame, which the next
//! frame will overwrite. Two swaps restore the original assignment.
//!
//! # Luminance
//!
//! Targets created with a luminance mip chain can reduce their readable
//! image to one texel. [`average_luminance`](RenderTarget::average_luminance)
//! turns the raw reading into `None` when it cannot drive exposure.

use glam::UVec2;

use crate::errors::{Result, validation_failure};
use crate::renderer::gpu::{
    ClearValue, GraphicsContext, Rect, TargetDesc, TargetId, TargetScope, TextureRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    id: TargetId,
    size: UVec2,
    double_buffered: bool,
}

impl RenderTarget {
    /// Creates the framebuffer described by `desc`.
    ///
    /// An incomplete framebuffer is a GPU validation failure.
    pub fn new(gfx: &mut dyn GraphicsContext, desc: &TargetDesc) -> Result<Self> {
        let id = gfx.create_target(desc).map_err(validation_failure)?;
        log::debug!("Allocated target '{}' ({}x{})", desc.label, desc.size.x, desc.size.y);
        Ok(Self {
            id,
            size: desc.size,
            double_buffered: desc.double_buffered,
        })
    }

    /// Wraps a target that renders into part of `source`'s attachments.
    pub fn alias(
        gfx: &mut dyn GraphicsContext,
        label: &str,
        source: &RenderTarget,
        color_attachments: &[u32],
        with_depth: bool,
    ) -> Result<Self> {
        let id = gfx
            .create_alias_target(label, source.id, color_attachments, with_depth)
            .map_err(validation_failure)?;
        Ok(Self {
            id,
            size: source.size,
            double_buffered: false,
        })
    }

    /// The display-bound target.
    #[must_use]
    pub fn screen(gfx: &dyn GraphicsContext) -> Self {
        Self {
            id: gfx.screen(),
            size: gfx.screen_size(),
            double_buffered: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TargetId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    /// Full-target rectangle.
    #[inline]
    #[must_use]
    pub fn viewport(&self) -> Rect {
        Rect::from_size(self.size)
    }

    /// Binds the target. It stays bound until the scope is dropped.
    pub fn bind<'a>(&self, gfx: &'a mut dyn GraphicsContext) -> TargetScope<'a> {
        TargetScope::new(gfx, self.id)
    }

    /// Binds, clears and unbinds.
    pub fn clear(&self, gfx: &mut dyn GraphicsContext, value: ClearValue) {
        let mut scope = self.bind(gfx);
        scope.clear(value);
    }

    /// Exchanges the front and back images of attachment 0.
    pub fn swap(&self, gfx: &mut dyn GraphicsContext) {
        if !self.double_buffered {
            log::warn!("Ignoring swap of single-buffered target {:?}", self.id);
            return;
        }
        gfx.swap_color_attachments(self.id);
    }

    pub fn generate_luminance(&self, gfx: &mut dyn GraphicsContext) {
        gfx.generate_luminance_mipmaps(self.id);
    }

    /// Average luminance of the readable image, or `None` when the reading is
    /// NaN, infinite or not positive (e.g. an all-black frame).
    ///
    /// Requires [`generate_luminance`](Self::generate_luminance) since the
    /// last swap.
    pub fn average_luminance(&self, gfx: &mut dyn GraphicsContext) -> Option<f32> {
        let value = gfx.read_average_luminance(self.id);
        if value.is_finite() && value > 0.0 {
            Some(value)
        } else {
            log::debug!("Discarding luminance reading {value}");
            None
        }
    }

    /// The readable color image (the back image when double-buffered).
    #[inline]
    #[must_use]
    pub fn color(&self) -> TextureRef {
        TextureRef::Color(self.id)
    }

    /// The front image of a double-buffered target.
    #[inline]
    #[must_use]
    pub fn history(&self) -> TextureRef {
        TextureRef::History(self.id)
    }

    /// The image the most recent draw into this target wrote, before any
    /// swap.
    #[inline]
    #[must_use]
    pub fn written(&self) -> TextureRef {
        if self.double_buffered {
            self.history()
        } else {
            self.color()
        }
    }

    #[inline]
    #[must_use]
    pub fn attachment(&self, index: u32) -> TextureRef {
        TextureRef::Attachment {
            target: self.id,
            index,
        }
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> TextureRef {
        TextureRef::Depth(self.id)
    }

    /// Destroys the framebuffer. The handle must not be used afterwards.
    pub fn release(self, gfx: &mut dyn GraphicsContext) {
        gfx.destroy_target(self.id);
    }
}
