//! Programs & Pipelines
//!
//! A program is a WGSL module plus a declared interface: an ordered list of
//! uniforms (packed into one uniform buffer at binding 0) and a list of
//! texture slots. Render pipelines are derived lazily from the program and
//! the fixed-function state active at draw time, and cached per state key.
//!
//! # Bind Group 0
//!
//! | Binding | Resource |
//! |---------|----------|
//! | 0 | Uniform buffer, fields in declaration order |
//! | 1 | Linear clamp sampler |
//! | 2 + n | Texture for slot `n` |

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{GloamError, Result};
use crate::renderer::gpu::{BlendMode, UniformKind, UniformValue};

/// Binding index of the first texture slot.
pub const FIRST_TEXTURE_BINDING: u32 = 2;

/// What a texture slot samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlotKind {
    /// Filterable 2D float texture (`texture_2d<f32>`).
    Float,
    /// 2D float texture read with `textureLoad` only.
    UnfilterableFloat,
    /// Depth texture (`texture_depth_2d`).
    Depth,
    /// Cube texture (`texture_cube<f32>`).
    Cube,
}

/// A texture slot of a program, bound through
/// [`bind_texture`](crate::renderer::gpu::GraphicsContext::bind_texture) on
/// `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlot {
    pub unit: u32,
    pub kind: TextureSlotKind,
}

impl TextureSlot {
    #[must_use]
    pub const fn new(unit: u32, kind: TextureSlotKind) -> Self {
        Self { unit, kind }
    }
}

/// Vertex buffer layout for programs that draw meshes.
#[derive(Debug, Clone)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Everything needed to register a program with
/// [`WgpuGraphics::register_program`](super::WgpuGraphics::register_program).
#[derive(Debug, Clone)]
pub struct WgpuProgramDesc<'a> {
    pub name: &'a str,
    pub source: Cow<'a, str>,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub uniforms: &'a [(&'a str, UniformKind)],
    pub textures: &'a [TextureSlot],
    pub vertex_layout: Option<VertexLayout>,
}

// ============================================================================
// Uniform Layout
// ============================================================================

/// WGSL uniform address-space layout of a flat struct.
#[derive(Debug, Clone, Default)]
pub(crate) struct UniformLayout {
    fields: Vec<(String, UniformKind, u64)>,
    size: u64,
}

const fn align_and_size(kind: UniformKind) -> (u64, u64) {
    match kind {
        UniformKind::Float => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec4 => (16, 16),
        UniformKind::Mat4 => (16, 64),
    }
}

impl UniformLayout {
    pub(crate) fn new(uniforms: &[(&str, UniformKind)]) -> Self {
        let mut offset = 0u64;
        let mut fields = Vec::with_capacity(uniforms.len());
        for (name, kind) in uniforms {
            let (align, size) = align_and_size(*kind);
            offset = offset.next_multiple_of(align);
            fields.push(((*name).to_string(), *kind, offset));
            offset += size;
        }
        Self {
            fields,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    pub(crate) fn kind_of(&self, name: &str) -> Option<UniformKind> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, kind, _)| *kind)
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Packs the current values. Unset fields are zero.
    pub(crate) fn pack(&self, values: &FxHashMap<String, UniformValue>) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        for (name, _, offset) in &self.fields {
            if let Some(value) = values.get(name) {
                let src = value.as_bytes();
                let start = *offset as usize;
                bytes[start..start + src.len()].copy_from_slice(src);
            }
        }
        bytes
    }
}

// ============================================================================
// Pipeline Key
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub color: SmallVec<[wgpu::TextureFormat; 4]>,
    pub depth: Option<wgpu::TextureFormat>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
    pub with_vertices: bool,
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Replace => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        }),
    }
}

// ============================================================================
// WgpuProgram
// ============================================================================

pub(crate) struct WgpuProgram {
    pub name: String,
    module: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    pub uniforms: UniformLayout,
    pub textures: Vec<TextureSlot>,
    vertex_layout: Option<VertexLayout>,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// Uniform values persist per program, as in GL.
    pub values: FxHashMap<String, UniformValue>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl WgpuProgram {
    pub(crate) fn new(device: &wgpu::Device, desc: &WgpuProgramDesc<'_>) -> Result<Self> {
        for entry in [desc.vertex_entry, desc.fragment_entry] {
            if !desc.source.contains(&format!("fn {entry}(")) {
                return Err(GloamError::ProgramLink {
                    name: desc.name.to_string(),
                    reason: format!("entry point '{entry}' not found"),
                });
            }
        }

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name),
            source: wgpu::ShaderSource::Wgsl(desc.source.clone()),
        });

        let uniforms = UniformLayout::new(desc.uniforms);

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(uniforms.size()),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for (n, slot) in desc.textures.iter().enumerate() {
            let (sample_type, view_dimension) = match slot.kind {
                TextureSlotKind::Float => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                ),
                TextureSlotKind::UnfilterableFloat => (
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2,
                ),
                TextureSlotKind::Depth => {
                    (wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2)
                }
                TextureSlotKind::Cube => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                ),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIRST_TEXTURE_BINDING + n as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Layout", desc.name)),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", desc.name)),
            bind_group_layouts: &[Some(&bind_group_layout)],
            immediate_size: 0,
        });

        Ok(Self {
            name: desc.name.to_string(),
            module,
            vertex_entry: desc.vertex_entry.to_string(),
            fragment_entry: desc.fragment_entry.to_string(),
            uniforms,
            textures: desc.textures.to_vec(),
            vertex_layout: desc.vertex_layout.clone(),
            bind_group_layout,
            pipeline_layout,
            values: FxHashMap::default(),
            pipelines: FxHashMap::default(),
        })
    }

    pub(crate) fn has_vertex_layout(&self) -> bool {
        self.vertex_layout.is_some()
    }

    /// Returns the pipeline for `key`, creating it on first use.
    pub(crate) fn pipeline(&mut self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.get(key) {
            return pipeline.clone();
        }
        log::debug!("Creating pipeline for '{}' ({key:?})", self.name);
        let pipeline = self.create_pipeline(device, key);
        self.pipelines.insert(key.clone(), pipeline.clone());
        pipeline
    }

    fn create_pipeline(&self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        let blend = blend_state(key.blend);
        let targets: SmallVec<[Option<wgpu::ColorTargetState>; 4]> = key
            .color
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let vertex_buffers: SmallVec<[wgpu::VertexBufferLayout<'_>; 1]> =
            match (&self.vertex_layout, key.with_vertices) {
                (Some(layout), true) => SmallVec::from_elem(
                    wgpu::VertexBufferLayout {
                        array_stride: layout.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &layout.attributes,
                    },
                    1,
                ),
                _ => SmallVec::new(),
            };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{} Pipeline", self.name)),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.module,
                entry_point: Some(&self.vertex_entry),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.module,
                entry_point: Some(&self.fragment_entry),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: key.depth.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: Some(key.depth_test && key.depth_write),
                depth_compare: if key.depth_test {
                    Some(wgpu::CompareFunction::LessEqual)
                } else {
                    Some(wgpu::CompareFunction::Always)
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layout_follows_wgsl_alignment() {
        let layout = UniformLayout::new(&[
            ("exposure", UniformKind::Float),
            ("texel", UniformKind::Vec2),
            ("tint", UniformKind::Vec3),
            ("strength", UniformKind::Float),
            ("matrix", UniformKind::Mat4),
        ]);
        let offsets: Vec<u64> = layout.fields.iter().map(|(_, _, o)| *o).collect();
        // vec2 aligns to 8, vec3 to 16; the float packs into the vec3's tail.
        assert_eq!(offsets, vec![0, 8, 16, 28, 32]);
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn empty_layout_still_has_a_binding_size() {
        assert_eq!(UniformLayout::new(&[]).size(), 16);
    }
}
