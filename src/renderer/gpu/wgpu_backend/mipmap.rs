// ============================================================================
// Downsample Chain
// ============================================================================
//
// Fills mip levels 1.. of a texture from level 0 with a 2x2 box filter. Odd
// extents fold the trailing row/column into the last texel, so the 1x1 level
// is the mean of the whole image rather than of its top-left power of two.
//
// `Luminance` converts to Rec. 709 luma on the first reduction and replicates
// it into every channel; the remaining levels average luma. `Average` keeps
// color (cubemap prefilter chains).

use std::borrow::Cow;

use rustc_hash::FxHashMap;

const DOWNSAMPLE_WGSL: &str = r"
@group(0) @binding(0) var source : texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) index : u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

fn box_filter(dst : vec2<u32>) -> vec4<f32> {
    let src_size = textureDimensions(source);
    let dst_size = max(src_size / 2u, vec2<u32>(1u));
    let lo = dst * 2u;
    // The last destination texel absorbs the odd remainder.
    var hi = lo + vec2<u32>(2u);
    if (dst.x == dst_size.x - 1u) { hi.x = src_size.x; }
    if (dst.y == dst_size.y - 1u) { hi.y = src_size.y; }
    hi = min(hi, src_size);

    var sum = vec4<f32>(0.0);
    var count = 0.0;
    for (var y = lo.y; y < hi.y; y++) {
        for (var x = lo.x; x < hi.x; x++) {
            sum += textureLoad(source, vec2<u32>(x, y), 0);
            count += 1.0;
        }
    }
    return sum / max(count, 1.0);
}

@fragment
fn fs_average(@builtin(position) frag : vec4<f32>) -> @location(0) vec4<f32> {
    return box_filter(vec2<u32>(frag.xy));
}

@fragment
fn fs_luminance(@builtin(position) frag : vec4<f32>) -> @location(0) vec4<f32> {
    let c = box_filter(vec2<u32>(frag.xy));
    let luma = dot(max(c.rgb, vec3<f32>(0.0)), vec3<f32>(0.2126, 0.7152, 0.0722));
    return vec4<f32>(vec3<f32>(luma), 1.0);
}
";

/// What the first reduction stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownsampleMode {
    Average,
    Luminance,
}

impl DownsampleMode {
    fn entry_point(self) -> &'static str {
        match self {
            Self::Average => "fs_average",
            Self::Luminance => "fs_luminance",
        }
    }
}

pub struct Downsampler {
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    pipelines: FxHashMap<(wgpu::TextureFormat, DownsampleMode), wgpu::RenderPipeline>,
}

impl Downsampler {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Downsample Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(DOWNSAMPLE_WGSL)),
        });

        // Cube layers are reduced one face at a time through D2 views.
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Downsample Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Downsample Pipeline Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        Self {
            layout,
            pipeline_layout,
            shader,
            pipelines: FxHashMap::default(),
        }
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        mode: DownsampleMode,
    ) -> &wgpu::RenderPipeline {
        let Self {
            pipelines,
            pipeline_layout,
            shader,
            ..
        } = self;
        pipelines.entry((format, mode)).or_insert_with(|| {
            log::debug!("Creating downsample pipeline {format:?} / {mode:?}");
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Downsample Pipeline"),
                layout: Some(pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some(mode.entry_point()),
                    targets: &[Some(format.into())],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }

    fn level_view(
        texture: &wgpu::Texture,
        level: u32,
        layer: u32,
        usage: wgpu::TextureUsages,
    ) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Downsample Level"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            usage: Some(usage),
            ..Default::default()
        })
    }

    /// Rebuilds levels `1..` of every layer of `texture`.
    pub fn generate(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        mode: DownsampleMode,
    ) {
        let levels = texture.mip_level_count();
        if levels < 2 {
            return;
        }
        let format = texture.format();
        // Later levels only ever average what the first one wrote.
        let first = self.pipeline(device, format, mode).clone();
        let rest = self.pipeline(device, format, DownsampleMode::Average).clone();

        for layer in 0..texture.depth_or_array_layers() {
            for level in 1..levels {
                let src = Self::level_view(
                    texture,
                    level - 1,
                    layer,
                    wgpu::TextureUsages::TEXTURE_BINDING,
                );
                let dst = Self::level_view(
                    texture,
                    level,
                    layer,
                    wgpu::TextureUsages::RENDER_ATTACHMENT,
                );
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Downsample Source"),
                    layout: &self.layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src),
                    }],
                });

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Downsample Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dst,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
                pass.set_pipeline(if level == 1 { &first } else { &rest });
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
    }
}
