//! wgpu Graphics Context
//!
//! [`WgpuGraphics`] implements [`GraphicsContext`] on top of wgpu. The GL-style
//! binding model the pipeline is written against maps onto wgpu as follows:
//!
//! - Commands are recorded into one `CommandEncoder` per frame, created lazily
//!   and submitted by `end_frame`, `flush` or a luminance readback.
//! - Each clear and each draw is its own render pass with `LoadOp::Load`, so
//!   binding a target costs nothing until something is drawn.
//! - Fixed-function state (depth test/write, blend) plus the bound target's
//!   formats select a cached render pipeline of the current program.
//! - The uniform values of a program persist between draws. They are packed
//!   into a fresh uniform buffer per draw.
//!
//! The screen is either an offscreen texture owned by the context or a view
//! supplied by the host each frame via [`WgpuGraphics::set_screen_view`]
//! (typically the current surface texture).

pub mod mipmap;
pub mod program;
pub mod readback;
pub mod shaders;

use glam::UVec2;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use self::mipmap::{DownsampleMode, Downsampler};
use self::program::{FIRST_TEXTURE_BINDING, PipelineKey, TextureSlotKind, WgpuProgram};
use self::readback::LuminanceReadback;
use self::shaders::BUILTIN_PROGRAMS;
use super::{
    BlendMode, ClearValue, ColorFormat, CubeFace, CubemapId, DepthFormat, GraphicsContext,
    MeshDesc, MeshId, ProgramId, Rect, TargetDesc, TargetId, TextureId, TextureRef, UniformValue,
};
use crate::errors::{GloamError, Result};

pub use self::program::{TextureSlot, VertexLayout, WgpuProgramDesc};

const ATTACHMENT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

fn color_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        ColorFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        ColorFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        ColorFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        ColorFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        ColorFormat::R16Float => wgpu::TextureFormat::R16Float,
    }
}

fn depth_format(format: DepthFormat) -> wgpu::TextureFormat {
    match format {
        DepthFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        DepthFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

// ============================================================================
// GPU Objects
// ============================================================================

struct GpuImage {
    texture: wgpu::Texture,
    /// Mip 0 only.
    render_view: wgpu::TextureView,
    /// All mips; depth aspect only for depth images.
    sample_view: wgpu::TextureView,
}

impl GpuImage {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: UVec2,
        format: wgpu::TextureFormat,
        mip_level_count: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: ATTACHMENT_USAGE,
            view_formats: &[],
        });
        let render_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });
        let aspect = if format.is_depth_stencil_format() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            aspect,
            ..Default::default()
        });
        Self {
            texture,
            render_view,
            sample_view,
        }
    }
}

struct ColorAttachment {
    format: wgpu::TextureFormat,
    /// One image, or two for the double-buffered attachment 0.
    images: SmallVec<[GpuImage; 2]>,
}

struct Alias {
    source: TargetId,
    attachments: SmallVec<[u32; 4]>,
    depth: bool,
}

struct GpuTarget {
    label: String,
    size: UVec2,
    color: SmallVec<[ColorAttachment; 4]>,
    depth: Option<(wgpu::TextureFormat, GpuImage)>,
    front: usize,
    alias: Option<Alias>,
    face: Option<wgpu::TextureView>,
}

impl GpuTarget {
    fn render_image(&self, index: usize) -> Option<&GpuImage> {
        let attachment = self.color.get(index)?;
        let slot = if index == 0 { self.front.min(attachment.images.len() - 1) } else { 0 };
        attachment.images.get(slot)
    }

    fn readable_image(&self, index: usize) -> Option<&GpuImage> {
        let attachment = self.color.get(index)?;
        let slot = if index == 0 && attachment.images.len() == 2 { 1 - self.front } else { 0 };
        attachment.images.get(slot)
    }
}

struct GpuCubemap {
    texture: wgpu::Texture,
    sample_view: wgpu::TextureView,
    size: u32,
    format: ColorFormat,
    mips_dirty: bool,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct Fallbacks {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    cube: wgpu::TextureView,
}

impl Fallbacks {
    fn new(device: &wgpu::Device) -> Self {
        let make = |label: &str, format, layers, dimension| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: layers,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(dimension),
                    ..Default::default()
                })
        };
        Self {
            color: make(
                "Fallback 2D",
                wgpu::TextureFormat::Rgba8Unorm,
                1,
                wgpu::TextureViewDimension::D2,
            ),
            depth: make(
                "Fallback Depth",
                wgpu::TextureFormat::Depth32Float,
                1,
                wgpu::TextureViewDimension::D2,
            ),
            cube: make(
                "Fallback Cube",
                wgpu::TextureFormat::Rgba8Unorm,
                6,
                wgpu::TextureViewDimension::Cube,
            ),
        }
    }

    fn for_kind(&self, kind: TextureSlotKind) -> &wgpu::TextureView {
        match kind {
            TextureSlotKind::Float | TextureSlotKind::UnfilterableFloat => &self.color,
            TextureSlotKind::Depth => &self.depth,
            TextureSlotKind::Cube => &self.cube,
        }
    }
}

// ============================================================================
// WgpuGraphics
// ============================================================================

/// wgpu implementation of [`GraphicsContext`].
///
/// # Usage
///
/// ```rust,ignore
/// let mut gfx = WgpuGraphics::new(device, queue, UVec2::new(1280, 720), surface_format);
/// gfx.register_builtin_programs()?;
///
/// // each frame
/// let frame = surface.get_current_texture()?;
/// gfx.set_screen_view(Some(frame.texture.create_view(&Default::default())));
/// renderer.render(&mut gfx, &mut scene, &window);
/// frame.present();
/// ```
pub struct WgpuGraphics {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    in_frame: bool,

    mipmaps: Downsampler,
    readback: LuminanceReadback,
    sampler: wgpu::Sampler,
    fallbacks: Fallbacks,

    screen: TargetId,
    screen_view: Option<wgpu::TextureView>,

    targets: SlotMap<TargetId, GpuTarget>,
    cubemaps: SlotMap<CubemapId, GpuCubemap>,
    textures: SlotMap<TextureId, (wgpu::Texture, wgpu::TextureView)>,
    meshes: SlotMap<MeshId, GpuMesh>,
    programs: SlotMap<ProgramId, WgpuProgram>,
    program_names: FxHashMap<String, ProgramId>,

    bind_stack: Vec<TargetId>,
    current_program: Option<ProgramId>,
    units: FxHashMap<u32, TextureRef>,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    depth_test: bool,
    depth_write: bool,
    blend: BlendMode,
}

impl WgpuGraphics {
    /// Wraps an existing device. `screen_format` is the format of the views
    /// passed to [`set_screen_view`](Self::set_screen_view).
    #[must_use]
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        screen_size: UVec2,
        screen_format: wgpu::TextureFormat,
    ) -> Self {
        let mipmaps = Downsampler::new(&device);
        let readback = LuminanceReadback::new(&device);
        let fallbacks = Fallbacks::new(&device);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let mut targets = SlotMap::with_key();
        let screen = targets.insert(Self::screen_target(&device, screen_size, screen_format));

        Self {
            device,
            queue,
            encoder: None,
            in_frame: false,
            mipmaps,
            readback,
            sampler,
            fallbacks,
            screen,
            screen_view: None,
            targets,
            cubemaps: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            program_names: FxHashMap::default(),
            bind_stack: Vec::new(),
            current_program: None,
            units: FxHashMap::default(),
            viewport: None,
            scissor: None,
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Replace,
        }
    }

    /// Creates a device without a surface, renders into an owned screen
    /// texture, and registers the built-in programs.
    pub fn new_offscreen(screen_size: UVec2) -> Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| GloamError::AdapterRequestFailed(e.to_string()))?;
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("gloam"),
                    ..Default::default()
                })
                .await?;
            let mut gfx = Self::new(device, queue, screen_size, wgpu::TextureFormat::Rgba8Unorm);
            gfx.register_builtin_programs()?;
            Ok(gfx)
        })
    }

    fn screen_target(device: &wgpu::Device, size: UVec2, format: wgpu::TextureFormat) -> GpuTarget {
        let size = size.max(UVec2::ONE);
        let mut images = SmallVec::new();
        images.push(GpuImage::new(device, "Screen", size, format, 1));
        let mut color = SmallVec::new();
        color.push(ColorAttachment { format, images });
        GpuTarget {
            label: "screen".to_string(),
            size,
            color,
            depth: None,
            front: 0,
            alias: None,
            face: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Renders the screen into `view` until replaced. `None` returns to the
    /// owned offscreen texture.
    pub fn set_screen_view(&mut self, view: Option<wgpu::TextureView>) {
        self.screen_view = view;
    }

    /// The owned offscreen screen texture (for captures).
    #[must_use]
    pub fn screen_texture(&self) -> Option<&wgpu::Texture> {
        self.targets
            .get(self.screen)
            .and_then(|t| t.render_image(0))
            .map(|image| &image.texture)
    }

    /// Registers a program under `desc.name`, replacing any previous one.
    pub fn register_program(&mut self, desc: &WgpuProgramDesc<'_>) -> Result<ProgramId> {
        let program = WgpuProgram::new(&self.device, desc)?;
        if let Some(old) = self.program_names.remove(desc.name) {
            self.programs.remove(old);
        }
        let id = self.programs.insert(program);
        self.program_names.insert(desc.name.to_string(), id);
        log::debug!("Registered program '{}'", desc.name);
        Ok(id)
    }

    /// Registers the programs used by the deferred passes and post filters.
    pub fn register_builtin_programs(&mut self) -> Result<()> {
        for builtin in BUILTIN_PROGRAMS {
            let source = builtin.source();
            self.register_program(&WgpuProgramDesc {
                name: builtin.name,
                source: source.into(),
                vertex_entry: "vs_main",
                fragment_entry: "fs_main",
                uniforms: builtin.uniforms,
                textures: builtin.textures,
                vertex_layout: None,
            })?;
        }
        Ok(())
    }

    /// Uploads a 2D texture (LUTs, baked shadow maps). `data` is tightly packed.
    pub fn create_texture(
        &mut self,
        label: &str,
        size: UVec2,
        format: ColorFormat,
        data: &[u8],
    ) -> TextureId {
        let format = color_format(format);
        let extent = wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let bytes_per_texel = format.block_copy_size(None).unwrap_or(4);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.x * bytes_per_texel),
                rows_per_image: Some(size.y),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert((texture, view))
    }

    // === Internals ===

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn target_ref(&self, id: TargetId) -> Option<&GpuTarget> {
        let target = self.targets.get(id);
        if target.is_none() {
            log::error!("Stale render target handle {id:?}");
        }
        target
    }

    /// Views and formats written by a draw into `id`.
    fn render_attachments(
        &self,
        id: TargetId,
    ) -> Option<(
        SmallVec<[(wgpu::TextureView, wgpu::TextureFormat); 4]>,
        Option<(wgpu::TextureView, wgpu::TextureFormat)>,
    )> {
        let target = self.target_ref(id)?;
        let mut colors = SmallVec::new();

        if let Some(alias) = &target.alias {
            let source = self.target_ref(alias.source)?;
            for &index in &alias.attachments {
                let image = source.render_image(index as usize)?;
                colors.push((image.render_view.clone(), source.color[index as usize].format));
            }
            let depth = if alias.depth {
                source
                    .depth
                    .as_ref()
                    .map(|(format, image)| (image.render_view.clone(), *format))
            } else {
                None
            };
            return Some((colors, depth));
        }

        for (index, attachment) in target.color.iter().enumerate() {
            let view = match (index, &target.face, &self.screen_view) {
                (0, Some(face), _) => face.clone(),
                (0, _, Some(screen)) if id == self.screen => screen.clone(),
                _ => target.render_image(index)?.render_view.clone(),
            };
            colors.push((view, attachment.format));
        }
        let depth = target
            .depth
            .as_ref()
            .map(|(format, image)| (image.render_view.clone(), *format));
        Some((colors, depth))
    }

    fn sample_view(&self, texture: TextureRef) -> Option<wgpu::TextureView> {
        let (owner, index, history) = match texture {
            TextureRef::Color(t) => (t, 0, false),
            TextureRef::History(t) => (t, 0, true),
            TextureRef::Attachment { target, index } => (target, index, false),
            TextureRef::Depth(t) => {
                let target = self.target_ref(t)?;
                let owner = match &target.alias {
                    Some(alias) => self.target_ref(alias.source)?,
                    None => target,
                };
                return owner.depth.as_ref().map(|(_, image)| image.sample_view.clone());
            }
            TextureRef::Cubemap(c) => return self.cubemaps.get(c).map(|c| c.sample_view.clone()),
            TextureRef::External(x) => return self.textures.get(x).map(|(_, view)| view.clone()),
        };
        let target = self.target_ref(owner)?;
        let (target, index) = match &target.alias {
            Some(alias) => (
                self.target_ref(alias.source)?,
                alias.attachments.get(index as usize).copied().unwrap_or(index),
            ),
            None => (target, index),
        };
        let image = if history {
            target.render_image(index as usize)
        } else {
            target.readable_image(index as usize)
        };
        image.map(|image| image.sample_view.clone())
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("gloam Frame Encoder"),
                })
        })
    }

    /// Rebuilds the mip chains of dirty cubemaps about to be sampled.
    fn refresh_cubemap_mips(&mut self) {
        let dirty: SmallVec<[CubemapId; 2]> = self
            .units
            .values()
            .filter_map(|t| match t {
                TextureRef::Cubemap(c) if self.cubemaps.get(*c).is_some_and(|c| c.mips_dirty) => {
                    Some(*c)
                }
                _ => None,
            })
            .collect();
        for id in dirty {
            let encoder = self.encoder.get_or_insert_with(|| {
                self.device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("gloam Frame Encoder"),
                    })
            });
            if let Some(cube) = self.cubemaps.get_mut(id) {
                self.mipmaps
                    .generate(&self.device, encoder, &cube.texture, DownsampleMode::Average);
                cube.mips_dirty = false;
            }
        }
    }

    fn draw(&mut self, mesh: Option<MeshId>) {
        let Some(target_id) = self.bind_stack.last().copied() else {
            log::error!("Draw issued with no render target bound");
            return;
        };
        let Some(program_id) = self.current_program else {
            log::error!("Draw issued with no program bound");
            return;
        };
        let Some((colors, depth)) = self.render_attachments(target_id) else {
            return;
        };
        let Some(target_size) = self.targets.get(target_id).map(|t| t.size) else {
            return;
        };
        self.refresh_cubemap_mips();

        let Some(slots) = self.programs.get(program_id).map(|p| p.textures.clone()) else {
            return;
        };
        if mesh.is_some() && !self.programs[program_id].has_vertex_layout() {
            log::error!(
                "Program '{}' has no vertex layout; mesh draw skipped",
                self.programs[program_id].name
            );
            return;
        }
        let views: Vec<wgpu::TextureView> = slots
            .iter()
            .map(|slot| {
                self.units
                    .get(&slot.unit)
                    .and_then(|texture| self.sample_view(*texture))
                    .unwrap_or_else(|| self.fallbacks.for_kind(slot.kind).clone())
            })
            .collect();

        let key = PipelineKey {
            color: colors.iter().map(|(_, format)| *format).collect(),
            depth: depth.as_ref().map(|(_, format)| *format),
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            blend: self.blend,
            with_vertices: mesh.is_some(),
        };

        let program = &mut self.programs[program_id];
        let pipeline = program.pipeline(&self.device, &key);
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Uniforms", program.name)),
            contents: &program.uniforms.pack(&program.values),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (n, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_TEXTURE_BINDING + n as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", program.name)),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let viewport = self.viewport.unwrap_or(Rect::from_size(target_size));
        let scissor = clamp_rect(self.scissor.unwrap_or(viewport), target_size);
        if scissor.is_empty() {
            return;
        }

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("gloam Frame Encoder"),
                })
        });
        let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; 4]> = colors
            .iter()
            .map(|(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gloam Draw"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.as_ref().map(|(view, _)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);

        match mesh.and_then(|m| self.meshes.get(m)) {
            Some(mesh) => {
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
            None => pass.draw(0..3, 0..1),
        }
    }
}

fn clamp_rect(rect: Rect, size: UVec2) -> Rect {
    let x = rect.x.min(size.x);
    let y = rect.y.min(size.y);
    Rect::new(
        x,
        y,
        rect.width.min(size.x - x),
        rect.height.min(size.y - y),
    )
}

impl GraphicsContext for WgpuGraphics {
    fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            log::warn!("begin_frame called while a frame is open; submitting it");
            self.submit();
        }
        self.in_frame = true;
        self.encoder();
        Ok(())
    }

    fn end_frame(&mut self) {
        if !self.bind_stack.is_empty() {
            log::error!("Frame ended with {} target(s) still bound", self.bind_stack.len());
            self.bind_stack.clear();
        }
        self.submit();
        self.in_frame = false;
    }

    fn flush(&mut self) {
        self.submit();
    }

    fn screen(&self) -> TargetId {
        self.screen
    }

    fn screen_size(&self) -> UVec2 {
        self.targets.get(self.screen).map_or(UVec2::ZERO, |t| t.size)
    }

    fn resize_screen(&mut self, size: UVec2) {
        if size.x == 0 || size.y == 0 {
            return;
        }
        let format = self
            .targets
            .get(self.screen)
            .and_then(|t| t.color.first())
            .map_or(wgpu::TextureFormat::Rgba8Unorm, |c| c.format);
        let screen = Self::screen_target(&self.device, size, format);
        if let Some(target) = self.targets.get_mut(self.screen) {
            *target = screen;
        }
    }

    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        desc.validate()?;
        let mut color = SmallVec::new();
        for (index, format) in desc.color.iter().enumerate() {
            let format = color_format(*format);
            let primary = index == 0;
            let mips = if primary && desc.luminance_mips {
                desc.luminance_mip_count()
            } else {
                1
            };
            let count = if primary && desc.double_buffered { 2 } else { 1 };
            let images = (0..count)
                .map(|slot| {
                    GpuImage::new(
                        &self.device,
                        &format!("{} Color{index}.{slot}", desc.label),
                        desc.size,
                        format,
                        mips,
                    )
                })
                .collect();
            color.push(ColorAttachment { format, images });
        }
        let depth = desc.depth.map(|format| {
            let format = depth_format(format);
            let image = GpuImage::new(
                &self.device,
                &format!("{} Depth", desc.label),
                desc.size,
                format,
                1,
            );
            (format, image)
        });

        log::debug!("Created render target '{}' {}x{}", desc.label, desc.size.x, desc.size.y);
        Ok(self.targets.insert(GpuTarget {
            label: desc.label.clone(),
            size: desc.size,
            color,
            depth,
            front: 0,
            alias: None,
            face: None,
        }))
    }

    fn create_alias_target(
        &mut self,
        label: &str,
        source: TargetId,
        color_attachments: &[u32],
        with_depth: bool,
    ) -> Result<TargetId> {
        let incomplete = |reason: &str| GloamError::IncompleteTarget {
            label: label.to_string(),
            reason: reason.to_string(),
        };
        let src = self
            .targets
            .get(source)
            .ok_or_else(|| GloamError::UnknownTarget(format!("{source:?}")))?;
        if src.alias.is_some() {
            return Err(incomplete("cannot alias an alias"));
        }
        if color_attachments.iter().any(|&i| i as usize >= src.color.len()) {
            return Err(incomplete("attachment index out of range"));
        }
        if with_depth && src.depth.is_none() {
            return Err(incomplete("source has no depth attachment"));
        }
        if color_attachments.is_empty() && !with_depth {
            return Err(incomplete("no attachments"));
        }
        let size = src.size;
        Ok(self.targets.insert(GpuTarget {
            label: label.to_string(),
            size,
            color: SmallVec::new(),
            depth: None,
            front: 0,
            alias: Some(Alias {
                source,
                attachments: SmallVec::from_slice(color_attachments),
                depth: with_depth,
            }),
            face: None,
        }))
    }

    fn destroy_target(&mut self, target: TargetId) {
        if target == self.screen {
            log::warn!("Ignoring request to destroy the screen target");
            return;
        }
        if let Some(t) = self.targets.remove(target) {
            log::debug!("Destroyed render target '{}'", t.label);
        }
    }

    fn target_size(&self, target: TargetId) -> Option<UVec2> {
        self.targets.get(target).map(|t| t.size)
    }

    fn bind_target(&mut self, target: TargetId) {
        if self.target_ref(target).is_some() {
            self.bind_stack.push(target);
        }
    }

    fn unbind_target(&mut self, target: TargetId) {
        let top = self.bind_stack.last().copied();
        assert_eq!(
            top,
            Some(target),
            "unbind of {target:?} does not match innermost bound target {top:?}"
        );
        self.bind_stack.pop();
    }

    fn bound_target(&self) -> Option<TargetId> {
        self.bind_stack.last().copied()
    }

    fn clear(&mut self, value: ClearValue) {
        let Some(target) = self.bind_stack.last().copied() else {
            log::error!("Clear issued with no render target bound");
            return;
        };
        let Some((colors, depth)) = self.render_attachments(target) else {
            return;
        };
        let color_load = value.color.map_or(wgpu::LoadOp::Load, |c| {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(c.x),
                g: f64::from(c.y),
                b: f64::from(c.z),
                a: f64::from(c.w),
            })
        });
        let depth_load = value.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);

        let encoder = self.encoder();
        let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; 4]> = colors
            .iter()
            .map(|(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gloam Clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.as_ref().map(|(view, _)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }

    fn blit_depth(&mut self, src: TargetId, dst: TargetId) {
        let (Some(s), Some(d)) = (self.targets.get(src), self.targets.get(dst)) else {
            log::error!("Depth blit between unknown targets");
            return;
        };
        let (Some((src_format, src_image)), Some((dst_format, dst_image))) = (&s.depth, &d.depth)
        else {
            log::error!("Depth blit between '{}' and '{}' without depth", s.label, d.label);
            return;
        };
        if s.size != d.size || src_format != dst_format {
            log::error!("Depth blit between incompatible targets '{}' and '{}'", s.label, d.label);
            return;
        }
        if *src_format != wgpu::TextureFormat::Depth32Float {
            log::error!("Depth blit requires Depth32Float, got {src_format:?}");
            return;
        }
        let (src_texture, dst_texture, size) =
            (src_image.texture.clone(), dst_image.texture.clone(), s.size);
        self.encoder().copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
        );
    }

    fn swap_color_attachments(&mut self, target: TargetId) {
        let Some(t) = self.targets.get_mut(target) else {
            log::error!("Swap on unknown target {target:?}");
            return;
        };
        if t.color.first().is_none_or(|c| c.images.len() != 2) {
            log::error!("Swap on single-buffered target '{}'", t.label);
            return;
        }
        t.front = 1 - t.front;
    }

    fn generate_luminance_mipmaps(&mut self, target: TargetId) {
        let Some(texture) = self
            .targets
            .get(target)
            .and_then(|t| t.readable_image(0))
            .map(|image| image.texture.clone())
        else {
            return;
        };
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("gloam Frame Encoder"),
                })
        });
        self.mipmaps
            .generate(&self.device, encoder, &texture, DownsampleMode::Luminance);
    }

    fn read_average_luminance(&mut self, target: TargetId) -> f32 {
        let Some(texture) = self
            .targets
            .get(target)
            .and_then(|t| t.readable_image(0))
            .map(|image| image.texture.clone())
        else {
            return f32::NAN;
        };
        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("gloam Readback Encoder"),
                })
        });
        self.readback.copy_last_mip(&mut encoder, &texture);
        self.queue.submit(std::iter::once(encoder.finish()));
        match self.readback.resolve(&self.device, texture.format()) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{e}");
                f32::NAN
            }
        }
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.scissor = rect;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn find_program(&mut self, name: &str) -> Result<ProgramId> {
        self.program_names
            .get(name)
            .copied()
            .ok_or_else(|| GloamError::ProgramNotFound(name.to_string()))
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if self.current_program != program {
            self.units.clear();
        }
        self.current_program = program;
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(p)) else {
            log::error!("Uniform '{name}' uploaded with no program bound");
            return false;
        };
        if program.uniforms.kind_of(name) != Some(value.kind()) {
            return false;
        }
        program.values.insert(name.to_string(), value);
        true
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureRef) {
        self.units.insert(unit, texture);
    }

    fn upload_mesh(&mut self, desc: &MeshDesc<'_>) -> MeshId {
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertices", desc.label)),
            contents: desc.vertex_data,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Indices", desc.label)),
            contents: bytemuck::cast_slice(desc.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.insert(GpuMesh {
            vertices,
            indices,
            index_count: desc.indices.len() as u32,
        })
    }

    fn draw_fullscreen(&mut self) {
        self.draw(None);
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        if !self.meshes.contains_key(mesh) {
            log::error!("Stale mesh handle {mesh:?}");
            return;
        }
        self.draw(Some(mesh));
    }

    fn create_cubemap(&mut self, label: &str, size: u32, format: ColorFormat) -> Result<CubemapId> {
        if size == 0 {
            return Err(GloamError::IncompleteTarget {
                label: label.to_string(),
                reason: "zero-sized cubemap".to_string(),
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 32 - size.leading_zeros(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: color_format(format),
            usage: ATTACHMENT_USAGE,
            view_formats: &[],
        });
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Ok(self.cubemaps.insert(GpuCubemap {
            texture,
            sample_view,
            size,
            format,
            mips_dirty: true,
        }))
    }

    fn destroy_cubemap(&mut self, cubemap: CubemapId) {
        self.cubemaps.remove(cubemap);
    }

    fn cubemap_size(&self, cubemap: CubemapId) -> Option<u32> {
        self.cubemaps.get(cubemap).map(|c| c.size)
    }

    fn cubemap_format(&self, cubemap: CubemapId) -> Option<ColorFormat> {
        self.cubemaps.get(cubemap).map(|c| c.format)
    }

    fn attach_cube_face(
        &mut self,
        target: TargetId,
        cubemap: CubemapId,
        face: CubeFace,
    ) -> Result<()> {
        let cube = self
            .cubemaps
            .get(cubemap)
            .ok_or_else(|| GloamError::UnknownCubemap(format!("{cubemap:?}")))?;
        let t = self
            .targets
            .get_mut(target)
            .ok_or_else(|| GloamError::UnknownTarget(format!("{target:?}")))?;
        if t.size != UVec2::splat(cube.size)
            || t.color.first().map(|c| c.format) != Some(color_format(cube.format))
        {
            return Err(GloamError::IncompleteTarget {
                label: t.label.clone(),
                reason: format!(
                    "cube face is {}x{} {:?}",
                    cube.size, cube.size, cube.format
                ),
            });
        }
        t.face = Some(cube.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Cube Face"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: face.layer(),
            array_layer_count: Some(1),
            usage: Some(wgpu::TextureUsages::RENDER_ATTACHMENT),
            ..Default::default()
        }));
        Ok(())
    }

    fn detach_cube_face(&mut self, target: TargetId) {
        if let Some(t) = self.targets.get_mut(target) {
            t.face = None;
        }
    }

    fn invalidate_cubemap_mipmaps(&mut self, cubemap: CubemapId) {
        if let Some(cube) = self.cubemaps.get_mut(cubemap) {
            cube.mips_dirty = true;
        }
    }
}
