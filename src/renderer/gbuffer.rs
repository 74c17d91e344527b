//! G-Buffer
//!
//! Fixed channel layout written once per frame by the pre-step and read by
//! every later pass of the frame:
//!
//! | Attachment | Format | Content |
//! |------------|--------|---------|
//! | 0 | `Rgba16Float` | World position, `w = 1` where geometry was drawn |
//! | 1 | `Rgba16Float` | Octahedral normal (`xy`), screen-space velocity (`zw`) |
//! | 2 | `Rgba8Unorm` | Albedo |
//! | depth | `Depth32Float` | Hardware depth |
//!
//! Decals render through a second framebuffer aliasing the albedo and depth
//! attachments, so they blend onto the surface color without touching
//! position or normals.

use glam::{UVec2, Vec4};

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::{
    BlendMode, ClearValue, ColorFormat, DepthFormat, GraphicsContext, TargetDesc, TextureRef,
};
use crate::renderer::target::RenderTarget;
use crate::scene::{EntityLayer, RenderDimension, Scene};

pub const POSITION_ATTACHMENT: u32 = 0;
pub const NORMAL_VELOCITY_ATTACHMENT: u32 = 1;
pub const ALBEDO_ATTACHMENT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBuffer {
    target: RenderTarget,
    decals: RenderTarget,
}

impl GBuffer {
    pub fn new(gfx: &mut dyn GraphicsContext, label: &str, size: UVec2) -> Result<Self> {
        let desc = TargetDesc::color(format!("{label} GBuffer"), size, ColorFormat::Rgba16Float)
            .with_attachment(ColorFormat::Rgba16Float)
            .with_attachment(ColorFormat::Rgba8Unorm)
            .with_depth(DepthFormat::Depth32Float);
        let target = RenderTarget::new(gfx, &desc)?;
        let decals = match RenderTarget::alias(
            gfx,
            &format!("{label} Decals"),
            &target,
            &[ALBEDO_ATTACHMENT],
            true,
        ) {
            Ok(decals) => decals,
            Err(e) => {
                target.release(gfx);
                return Err(e);
            }
        };
        Ok(Self { target, decals })
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// The framebuffer decals render into.
    #[inline]
    #[must_use]
    pub fn decal_target(&self) -> &RenderTarget {
        &self.decals
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.target.size()
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> TextureRef {
        self.target.attachment(POSITION_ATTACHMENT)
    }

    #[inline]
    #[must_use]
    pub fn normal_velocity(&self) -> TextureRef {
        self.target.attachment(NORMAL_VELOCITY_ATTACHMENT)
    }

    #[inline]
    #[must_use]
    pub fn albedo(&self) -> TextureRef {
        self.target.attachment(ALBEDO_ATTACHMENT)
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> TextureRef {
        self.target.depth()
    }

    /// Clears every channel and renders the scene's opaque 3D entities.
    pub fn fill(&self, gfx: &mut dyn GraphicsContext, scene: &dyn Scene, ctx: &RenderingContext) {
        let mut scope = self.target.bind(gfx);
        scope.set_viewport(self.target.viewport());
        scope.set_scissor(None);
        scope.set_depth_test(true);
        scope.set_depth_write(true);
        scope.set_blend(BlendMode::Replace);
        scope.clear(ClearValue::all(Vec4::ZERO));
        scene.draw_entities(&mut *scope, ctx, EntityLayer::Opaque, RenderDimension::ThreeD);
    }

    /// Blends decals onto the albedo channel.
    ///
    /// Depth testing is off for the duration: decal volumes straddle the
    /// surfaces they project onto. Depth writes are off too, which lets the
    /// decal shaders sample [`depth`](Self::depth).
    pub fn render_decals(
        &self,
        gfx: &mut dyn GraphicsContext,
        scene: &dyn Scene,
        ctx: &RenderingContext,
    ) {
        let mut scope = self.decals.bind(gfx);
        scope.set_viewport(self.decals.viewport());
        scope.set_depth_test(false);
        scope.set_depth_write(false);
        scope.set_blend(BlendMode::Alpha);
        scene.draw_entities(&mut *scope, ctx, EntityLayer::Decal, RenderDimension::ThreeD);
        scope.set_blend(BlendMode::Replace);
        scope.set_depth_write(true);
        scope.set_depth_test(true);
    }

    pub fn release(self, gfx: &mut dyn GraphicsContext) {
        self.decals.release(gfx);
        self.target.release(gfx);
    }
}
