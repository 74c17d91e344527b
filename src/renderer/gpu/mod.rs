//! Graphics Context
//!
//! The GPU is a single global state machine: one bound target, one bound
//! program and one table of texture units at a time. Instead of hiding that
//! state behind a singleton, every pipeline call receives it explicitly as a
//! `&mut dyn GraphicsContext`.
//!
//! Binding is scoped. [`TargetScope`] binds a target on creation and unbinds it
//! on drop, so the context is never left pointing at a stale target, whether a
//! pass returns early or unwinds. Scopes dereference to the context, which
//! makes nested work flow through the innermost scope and keeps bind/unbind
//! spans properly nested.
//!
//! # Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`wgpu_backend::WgpuGraphics`] | Real GPU rendering |
//! | [`headless::HeadlessContext`] | Validating command recorder (tests, CI) |

pub mod headless;
pub mod wgpu_backend;

use std::ops::{Deref, DerefMut};

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::errors::{GloamError, Result};

new_key_type! {
    /// Handle to a render target (framebuffer) owned by a context.
    pub struct TargetId;
    /// Handle to a cubemap texture owned by a context.
    pub struct CubemapId;
    /// Handle to an externally created 2D texture (LUTs, shadow maps).
    pub struct TextureId;
    /// Handle to an uploaded mesh.
    pub struct MeshId;
    /// Handle to a registered shader program.
    pub struct ProgramId;
}

// ============================================================================
// Formats & Descriptors
// ============================================================================

/// Color attachment formats understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    Rgba8Unorm,
    Rgba8Srgb,
    #[default]
    Rgba16Float,
    Rgba32Float,
    Rg16Float,
    R16Float,
}

impl ColorFormat {
    /// Float formats can hold HDR values and carry a luminance mip chain.
    #[inline]
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::Rgba16Float | Self::Rgba32Float | Self::Rg16Float | Self::R16Float
        )
    }

    /// Four-channel float formats: the ones a scene target and its
    /// luminance readback accept.
    #[inline]
    #[must_use]
    pub fn is_hdr_color(self) -> bool {
        matches!(self, Self::Rgba16Float | Self::Rgba32Float)
    }
}

/// Depth attachment formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFormat {
    /// Not copyable on every backend; avoid for targets used with
    /// [`GraphicsContext::blit_depth`].
    Depth24Stencil8,
    #[default]
    Depth32Float,
}

/// Description of a render target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDesc {
    pub label: String,
    pub size: UVec2,
    /// One entry per color attachment (MRT when more than one).
    pub color: SmallVec<[ColorFormat; 4]>,
    pub depth: Option<DepthFormat>,
    /// Attachment 0 gets a second physical image; see
    /// [`GraphicsContext::swap_color_attachments`].
    pub double_buffered: bool,
    /// Attachment 0 carries a full mip chain for luminance reduction.
    pub luminance_mips: bool,
}

impl TargetDesc {
    /// A single color attachment target.
    #[must_use]
    pub fn color(label: impl Into<String>, size: UVec2, format: ColorFormat) -> Self {
        Self {
            label: label.into(),
            size,
            color: SmallVec::from_slice(&[format]),
            depth: None,
            double_buffered: false,
            luminance_mips: false,
        }
    }

    /// Adds another color attachment.
    #[must_use]
    pub fn with_attachment(mut self, format: ColorFormat) -> Self {
        self.color.push(format);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, format: DepthFormat) -> Self {
        self.depth = Some(format);
        self
    }

    #[must_use]
    pub fn double_buffered(mut self) -> Self {
        self.double_buffered = true;
        self
    }

    #[must_use]
    pub fn with_luminance_mips(mut self) -> Self {
        self.luminance_mips = true;
        self
    }

    /// Number of mip levels a luminance chain needs for this size.
    #[must_use]
    pub fn luminance_mip_count(&self) -> u32 {
        32 - self.size.x.max(self.size.y).max(1).leading_zeros()
    }

    /// Checks framebuffer completeness.
    ///
    /// Backends call this before allocating anything.
    pub fn validate(&self) -> Result<()> {
        let incomplete = |reason: &str| GloamError::IncompleteTarget {
            label: self.label.clone(),
            reason: reason.to_string(),
        };
        if self.size.x == 0 || self.size.y == 0 {
            return Err(incomplete("zero-sized target"));
        }
        if self.color.is_empty() && self.depth.is_none() {
            return Err(incomplete("no attachments"));
        }
        if self.double_buffered && self.color.is_empty() {
            return Err(incomplete("double buffering requires a color attachment"));
        }
        if self.luminance_mips && !self.color.first().is_some_and(|f| f.is_hdr_color()) {
            return Err(incomplete("luminance mips require an RGBA float color attachment"));
        }
        Ok(())
    }
}

/// Vertex and index data for [`GraphicsContext::upload_mesh`].
#[derive(Debug, Clone, Copy)]
pub struct MeshDesc<'a> {
    pub label: &'a str,
    pub vertex_data: &'a [u8],
    pub vertex_stride: u32,
    pub indices: &'a [u32],
}

// ============================================================================
// State Values
// ============================================================================

/// Pixel rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[inline]
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Full rectangle for a surface of the given size.
    #[inline]
    #[must_use]
    pub const fn from_size(size: UVec2) -> Self {
        Self::new(0, 0, size.x, size.y)
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What [`GraphicsContext::clear`] resets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValue {
    pub color: Option<Vec4>,
    pub depth: Option<f32>,
}

impl ClearValue {
    /// Clears color attachments only.
    #[must_use]
    pub fn color(color: Vec4) -> Self {
        Self {
            color: Some(color),
            depth: None,
        }
    }

    /// Clears color to `color` and depth to the far plane.
    #[must_use]
    pub fn all(color: Vec4) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }
}

/// Fixed-function blending presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Source overwrites destination.
    #[default]
    Replace,
    /// Premultiplied-style `src * a + dst * (1 - a)`.
    Alpha,
    /// `src + dst`, used for light accumulation.
    Additive,
}

/// The six faces of a cubemap, in the conventional layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Array layer of this face in a cube texture.
    #[inline]
    #[must_use]
    pub const fn layer(self) -> u32 {
        match self {
            Self::PositiveX => 0,
            Self::NegativeX => 1,
            Self::PositiveY => 2,
            Self::NegativeY => 3,
            Self::PositiveZ => 4,
            Self::NegativeZ => 5,
        }
    }

    /// Viewing direction and up vector used when rendering this face.
    #[must_use]
    pub fn basis(self) -> (Vec3, Vec3) {
        match self {
            Self::PositiveX => (Vec3::X, Vec3::NEG_Y),
            Self::NegativeX => (Vec3::NEG_X, Vec3::NEG_Y),
            Self::PositiveY => (Vec3::Y, Vec3::Z),
            Self::NegativeY => (Vec3::NEG_Y, Vec3::NEG_Z),
            Self::PositiveZ => (Vec3::Z, Vec3::NEG_Y),
            Self::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_Y),
        }
    }
}

// ============================================================================
// Texture References & Uniform Values
// ============================================================================

/// A sampled image, named by role rather than by physical texture.
///
/// Roles are resolved by the backend at bind time, which is what lets a
/// double-buffered target swap its attachments without anyone re-wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureRef {
    /// The readable color of a target: the back attachment of a
    /// double-buffered target (the most recently resolved image), or its
    /// only attachment otherwise.
    Color(TargetId),
    /// The front attachment of a double-buffered target. After a swap this is
    /// the previous frame's image, about to be overwritten.
    History(TargetId),
    /// Color attachment `index` of a multi-attachment target.
    Attachment { target: TargetId, index: u32 },
    Depth(TargetId),
    Cubemap(CubemapId),
    External(TextureId),
}

/// Type tag of a uniform value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

/// A shader uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
            Self::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Raw little-endian bytes, tightly packed.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Float(v) => bytemuck::bytes_of(v),
            Self::Vec2(v) => bytemuck::bytes_of(v),
            Self::Vec3(v) => bytemuck::bytes_of(v),
            Self::Vec4(v) => bytemuck::bytes_of(v),
            Self::Mat4(v) => bytemuck::bytes_of(v),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

// ============================================================================
// GraphicsContext
// ============================================================================

/// Explicit handle to the GPU pipeline state.
///
/// All methods act on the single implicit pipeline the handle represents.
/// Violating the binding discipline (unbinding a target that is not the
/// innermost bound one, drawing with nothing bound, sampling the image being
/// rendered to) is a programming error and panics.
pub trait GraphicsContext {
    // --- Frame ---------------------------------------------------------------

    /// Starts recording a frame. A failure means the frame should be skipped.
    fn begin_frame(&mut self) -> Result<()>;
    /// Submits everything recorded since [`begin_frame`](Self::begin_frame).
    fn end_frame(&mut self);
    /// Submits pending work outside of a frame (cubemap capture).
    fn flush(&mut self);
    /// The default (display-bound) target.
    fn screen(&self) -> TargetId;
    fn screen_size(&self) -> UVec2;
    fn resize_screen(&mut self, size: UVec2);

    // --- Targets -------------------------------------------------------------

    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId>;
    /// Creates a target that renders into a subset of another target's
    /// attachments without owning them.
    fn create_alias_target(
        &mut self,
        label: &str,
        source: TargetId,
        color_attachments: &[u32],
        with_depth: bool,
    ) -> Result<TargetId>;
    fn destroy_target(&mut self, target: TargetId);
    fn target_size(&self, target: TargetId) -> Option<UVec2>;
    fn bind_target(&mut self, target: TargetId);
    /// Must be called with the innermost bound target.
    fn unbind_target(&mut self, target: TargetId);
    fn bound_target(&self) -> Option<TargetId>;
    fn clear(&mut self, value: ClearValue);
    /// Nearest-neighbour, depth-only copy.
    fn blit_depth(&mut self, src: TargetId, dst: TargetId);
    /// Exchanges the front and back roles of attachment 0 without copying.
    fn swap_color_attachments(&mut self, target: TargetId);
    /// Builds the mip chain of the readable color attachment.
    fn generate_luminance_mipmaps(&mut self, target: TargetId);
    /// Average luminance from the coarsest mip. May be NaN.
    fn read_average_luminance(&mut self, target: TargetId) -> f32;

    // --- Fixed-function state ------------------------------------------------

    fn set_viewport(&mut self, rect: Rect);
    fn set_scissor(&mut self, rect: Option<Rect>);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_blend(&mut self, mode: BlendMode);

    // --- Programs & textures -------------------------------------------------

    fn find_program(&mut self, name: &str) -> Result<ProgramId>;
    fn use_program(&mut self, program: Option<ProgramId>);
    /// Uploads a uniform to the current program. Returns `false` when the
    /// program has no uniform of that name and type.
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool;
    fn bind_texture(&mut self, unit: u32, texture: TextureRef);

    // --- Draws ---------------------------------------------------------------

    fn upload_mesh(&mut self, desc: &MeshDesc<'_>) -> MeshId;
    fn draw_fullscreen(&mut self);
    fn draw_mesh(&mut self, mesh: MeshId);

    // --- Cubemaps ------------------------------------------------------------

    fn create_cubemap(&mut self, label: &str, size: u32, format: ColorFormat) -> Result<CubemapId>;
    fn destroy_cubemap(&mut self, cubemap: CubemapId);
    fn cubemap_size(&self, cubemap: CubemapId) -> Option<u32>;
    fn cubemap_format(&self, cubemap: CubemapId) -> Option<ColorFormat>;
    /// Redirects color attachment 0 of `target` to one face of `cubemap`.
    ///
    /// Fails, leaving `target` untouched, when its size or first color
    /// format differs from the cubemap's.
    fn attach_cube_face(
        &mut self,
        target: TargetId,
        cubemap: CubemapId,
        face: CubeFace,
    ) -> Result<()>;
    fn detach_cube_face(&mut self, target: TargetId);
    /// Marks the cubemap's mip chain stale; it is rebuilt on next sample.
    fn invalidate_cubemap_mipmaps(&mut self, cubemap: CubemapId);
}

// ============================================================================
// Scope Guards
// ============================================================================

/// A bound render target. Unbinds on drop.
pub struct TargetScope<'a> {
    gfx: &'a mut dyn GraphicsContext,
    target: TargetId,
}

impl<'a> TargetScope<'a> {
    /// Binds `target` and returns the guard that will unbind it.
    pub fn new(gfx: &'a mut dyn GraphicsContext, target: TargetId) -> Self {
        gfx.bind_target(target);
        Self { gfx, target }
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> TargetId {
        self.target
    }
}

impl Drop for TargetScope<'_> {
    fn drop(&mut self) {
        self.gfx.unbind_target(self.target);
    }
}

impl<'a> Deref for TargetScope<'a> {
    type Target = dyn GraphicsContext + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.gfx
    }
}

impl DerefMut for TargetScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.gfx
    }
}

/// A program made current. Releases it on drop.
pub struct ProgramScope<'a> {
    gfx: &'a mut dyn GraphicsContext,
}

impl<'a> ProgramScope<'a> {
    pub fn new(gfx: &'a mut dyn GraphicsContext, program: ProgramId) -> Self {
        gfx.use_program(Some(program));
        Self { gfx }
    }
}

impl Drop for ProgramScope<'_> {
    fn drop(&mut self) {
        self.gfx.use_program(None);
    }
}

impl<'a> Deref for ProgramScope<'a> {
    type Target = dyn GraphicsContext + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.gfx
    }
}

impl DerefMut for ProgramScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.gfx
    }
}
