//! Cubemap Capture Targets
//!
//! A [`CubemapRenderTarget`] is everything one face capture needs: a G-buffer
//! and a resolve framebuffer, both sized to the cubemap. Before a face is
//! rendered the resolve framebuffer's color attachment is redirected to that
//! face of the destination cubemap.
//!
//! Capture targets can be kept across calls for probes that are re-captured
//! regularly; otherwise the renderer creates a transient one per capture.

use glam::UVec2;

use crate::errors::Result;
use crate::renderer::gbuffer::GBuffer;
use crate::renderer::gpu::{ColorFormat, CubemapId, DepthFormat, GraphicsContext, TargetDesc};
use crate::renderer::target::RenderTarget;

pub use crate::renderer::gpu::CubeFace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubemapRenderTarget {
    size: u32,
    format: ColorFormat,
    gbuffer: GBuffer,
    resolve: RenderTarget,
}

impl CubemapRenderTarget {
    /// Creates a capture target for cubemaps of edge `size` and color format
    /// `format`.
    pub fn new(gfx: &mut dyn GraphicsContext, size: u32, format: ColorFormat) -> Result<Self> {
        let extent = UVec2::splat(size);
        let gbuffer = GBuffer::new(gfx, "Cubemap", extent)?;
        let desc = TargetDesc::color("Cubemap Resolve", extent, format)
            .with_depth(DepthFormat::Depth32Float);
        let resolve = match RenderTarget::new(gfx, &desc) {
            Ok(resolve) => resolve,
            Err(e) => {
                gbuffer.release(gfx);
                return Err(e);
            }
        };
        Ok(Self {
            size,
            format,
            gbuffer,
            resolve,
        })
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> ColorFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// The framebuffer that writes into the attached face.
    #[inline]
    #[must_use]
    pub fn resolve_target(&self) -> &RenderTarget {
        &self.resolve
    }

    /// Whether this target can render into `cubemap`: same edge and same
    /// color format.
    #[must_use]
    pub fn fits(&self, gfx: &dyn GraphicsContext, cubemap: CubemapId) -> bool {
        gfx.cubemap_size(cubemap) == Some(self.size)
            && gfx.cubemap_format(cubemap) == Some(self.format)
    }

    /// Redirects the resolve framebuffer to `face` of `cubemap`.
    pub fn attach(
        &self,
        gfx: &mut dyn GraphicsContext,
        cubemap: CubemapId,
        face: CubeFace,
    ) -> Result<()> {
        gfx.attach_cube_face(self.resolve.id(), cubemap, face)
    }

    pub fn detach(&self, gfx: &mut dyn GraphicsContext) {
        gfx.detach_cube_face(self.resolve.id());
    }

    pub fn release(self, gfx: &mut dyn GraphicsContext) {
        self.resolve.release(gfx);
        self.gbuffer.release(gfx);
    }
}
