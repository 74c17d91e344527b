//! Built-in WGSL programs for the deferred passes and post filters.
//!
//! Every program shares [`PRELUDE`]: the full-screen triangle vertex stage,
//! the linear sampler at binding 1 and a few helpers. Uniform struct fields are
//! declared in exactly the order of the matching Rust-side interface, which is
//! what [`UniformLayout`](super::program::UniformLayout) packs against.

use crate::renderer::gpu::UniformKind::{Float, Mat4, Vec2, Vec3, Vec4};
use crate::renderer::gpu::UniformKind;

use super::program::{TextureSlot, TextureSlotKind};

/// A program shipped with the crate.
pub struct BuiltinProgram {
    pub name: &'static str,
    pub body: &'static str,
    pub uniforms: &'static [(&'static str, UniformKind)],
    pub textures: &'static [TextureSlot],
}

impl BuiltinProgram {
    /// Full WGSL source (prelude + body).
    #[must_use]
    pub fn source(&self) -> String {
        format!("{PRELUDE}\n{}", self.body)
    }
}

const fn float(unit: u32) -> TextureSlot {
    TextureSlot::new(unit, TextureSlotKind::Float)
}

const fn depth(unit: u32) -> TextureSlot {
    TextureSlot::new(unit, TextureSlotKind::Depth)
}

const fn cube(unit: u32) -> TextureSlot {
    TextureSlot::new(unit, TextureSlotKind::Cube)
}

pub const PRELUDE: &str = r"
struct VertexOutput {
    @builtin(position) position : vec4<f32>,
    @location(0) uv : vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index : u32) -> VertexOutput {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    var output : VertexOutput;
    output.position = vec4<f32>(pos[vertex_index], 0.0, 1.0);
    output.uv = pos[vertex_index] * 0.5 + 0.5;
    output.uv.y = 1.0 - output.uv.y;
    return output;
}

@group(0) @binding(1) var s_linear : sampler;

fn luminance(c : vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.2126, 0.7152, 0.0722));
}

fn hash(p : vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

// Octahedral normal decoding.
fn decode_normal(e : vec2<f32>) -> vec3<f32> {
    var n = vec3<f32>(e, 1.0 - abs(e.x) - abs(e.y));
    let t = max(-n.z, 0.0);
    n.x += select(t, -t, n.x >= 0.0);
    n.y += select(t, -t, n.y >= 0.0);
    return normalize(n);
}

fn project_uv(clip : vec4<f32>) -> vec2<f32> {
    let ndc = clip.xy / clip.w;
    return vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
}
";

// ============================================================================
// Deferred
// ============================================================================

const ENVIRONMENT_WGSL: &str = r"
struct Params {
    inverse_view_projection : mat4x4<f32>,
    view_projection : mat4x4<f32>,
    camera_position : vec3<f32>,
    ambient_intensity : f32,
    ambient_color : vec3<f32>,
    has_environment_map : f32,
    ssao_enabled : f32,
    ssao_radius : f32,
    ssao_bias : f32,
    ssao_intensity : f32,
    ssao_samples : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_position : texture_2d<f32>;
@group(0) @binding(3) var t_normal : texture_2d<f32>;
@group(0) @binding(4) var t_albedo : texture_2d<f32>;
@group(0) @binding(5) var t_depth : texture_depth_2d;
@group(0) @binding(6) var t_environment : texture_cube<f32>;

fn ambient_occlusion(position : vec3<f32>, normal : vec3<f32>, px : vec2<i32>) -> f32 {
    let dims = vec2<i32>(textureDimensions(t_position));
    let count = i32(params.ssao_samples);
    let seed = vec2<f32>(px);
    var occlusion = 0.0;
    for (var i = 0; i < count; i = i + 1) {
        let fi = f32(i);
        var d = normalize(vec3<f32>(
            hash(seed + vec2<f32>(fi, 0.0)) * 2.0 - 1.0,
            hash(seed + vec2<f32>(0.0, fi)) * 2.0 - 1.0,
            hash(seed + vec2<f32>(fi, fi)) * 2.0 - 1.0
        ) + vec3<f32>(1e-4));
        if (dot(d, normal) < 0.0) {
            d = -d;
        }
        let t = fi / f32(count);
        let sample_pos = position + d * params.ssao_radius * mix(0.1, 1.0, t * t);
        let uv = project_uv(params.view_projection * vec4<f32>(sample_pos, 1.0));
        let spx = clamp(vec2<i32>(uv * vec2<f32>(dims)), vec2<i32>(0), dims - vec2<i32>(1));
        let scene_pos = textureLoad(t_position, spx, 0).xyz;
        let sample_dist = distance(sample_pos, params.camera_position);
        let scene_dist = distance(scene_pos, params.camera_position);
        let range = smoothstep(0.0, 1.0, params.ssao_radius / max(distance(position, scene_pos), 1e-4));
        occlusion += select(0.0, 1.0, scene_dist <= sample_dist - params.ssao_bias) * range;
    }
    return clamp(1.0 - params.ssao_intensity * occlusion / f32(max(count, 1)), 0.0, 1.0);
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let dims = vec2<f32>(textureDimensions(t_position));
    let px = vec2<i32>(in.uv * dims);
    if (textureLoad(t_depth, px, 0) >= 1.0) {
        discard;
    }
    let position = textureLoad(t_position, px, 0).xyz;
    let normal = decode_normal(textureLoad(t_normal, px, 0).xy);
    let albedo = textureLoad(t_albedo, px, 0).rgb;

    var ambient = params.ambient_color;
    if (params.has_environment_map > 0.5) {
        let r = reflect(normalize(position - params.camera_position), normal);
        ambient += textureSampleLevel(t_environment, s_linear, r, 0.0).rgb;
    }
    var ao = 1.0;
    if (params.ssao_enabled > 0.5) {
        ao = ambient_occlusion(position, normal, px);
    }
    return vec4<f32>(albedo * ambient * params.ambient_intensity * ao, 1.0);
}
";

const LIGHT_WGSL: &str = r"
struct Params {
    camera_position : vec3<f32>,
    light_type : f32,
    light_color : vec3<f32>,
    light_intensity : f32,
    light_position : vec3<f32>,
    light_range : f32,
    light_direction : vec3<f32>,
    inner_cone_cos : f32,
    outer_cone_cos : f32,
    has_shadow : f32,
    shadow_bias : f32,
    shadow_view_projection : mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_position : texture_2d<f32>;
@group(0) @binding(3) var t_normal : texture_2d<f32>;
@group(0) @binding(4) var t_albedo : texture_2d<f32>;
@group(0) @binding(5) var t_depth : texture_depth_2d;
@group(0) @binding(6) var t_shadow : texture_depth_2d;

fn shadow_factor(position : vec3<f32>) -> f32 {
    if (params.has_shadow < 0.5) {
        return 1.0;
    }
    let clip = params.shadow_view_projection * vec4<f32>(position, 1.0);
    let uv = project_uv(clip);
    if (any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0))) {
        return 1.0;
    }
    let dims = vec2<i32>(textureDimensions(t_shadow));
    let spx = clamp(vec2<i32>(uv * vec2<f32>(dims)), vec2<i32>(0), dims - vec2<i32>(1));
    let stored = textureLoad(t_shadow, spx, 0);
    return select(0.0, 1.0, clip.z / clip.w - params.shadow_bias <= stored);
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let dims = vec2<f32>(textureDimensions(t_position));
    let px = vec2<i32>(in.uv * dims);
    if (textureLoad(t_depth, px, 0) >= 1.0) {
        discard;
    }
    let position = textureLoad(t_position, px, 0).xyz;
    let normal = decode_normal(textureLoad(t_normal, px, 0).xy);
    let albedo = textureLoad(t_albedo, px, 0).rgb;

    var l = -params.light_direction;
    var attenuation = 1.0;
    if (params.light_type > 0.5) {
        let d = params.light_position - position;
        let dist = length(d);
        l = d / max(dist, 1e-4);
        let ratio = dist / max(params.light_range, 1e-4);
        let f = clamp(1.0 - ratio * ratio * ratio * ratio, 0.0, 1.0);
        attenuation = f * f / (dist * dist + 1.0);
        if (params.light_type > 1.5) {
            let cd = dot(-l, params.light_direction);
            attenuation *= smoothstep(params.outer_cone_cos, params.inner_cone_cos, cd);
        }
    }

    let n_dot_l = max(dot(normal, l), 0.0);
    let v = normalize(params.camera_position - position);
    let h = normalize(l + v);
    let specular = pow(max(dot(normal, h), 0.0), 32.0) * 0.25;
    let radiance = params.light_color * params.light_intensity * attenuation * shadow_factor(position);
    return vec4<f32>((albedo * n_dot_l + vec3<f32>(specular)) * radiance, 1.0);
}
";

// ============================================================================
// Post Filters
// ============================================================================

const BLUR_WGSL: &str = r"
struct Params {
    direction : vec2<f32>,
    radius : f32,
    threshold : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_source : texture_2d<f32>;

fn fetch(uv : vec2<f32>) -> vec3<f32> {
    let c = textureSampleLevel(t_source, s_linear, uv, 0.0).rgb;
    if (params.threshold <= 0.0) {
        return c;
    }
    let l = luminance(c);
    return c * max(l - params.threshold, 0.0) / max(l, 1e-4);
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let texel = params.direction / vec2<f32>(textureDimensions(t_source));
    let sigma = max(params.radius, 0.5);
    let taps = min(i32(ceil(sigma * 2.0)), 32);
    var sum = vec3<f32>(0.0);
    var weight_sum = 0.0;
    for (var i = -taps; i <= taps; i = i + 1) {
        let fi = f32(i);
        let w = exp(-(fi * fi) / (2.0 * sigma * sigma));
        sum += fetch(in.uv + texel * fi) * w;
        weight_sum += w;
    }
    return vec4<f32>(sum / weight_sum, 1.0);
}
";

const HDR_PREPASS_WGSL: &str = r"
struct Params {
    glow_intensity : f32,
    has_glow : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_scene : texture_2d<f32>;
@group(0) @binding(3) var t_glow : texture_2d<f32>;

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSampleLevel(t_scene, s_linear, in.uv, 0.0).rgb;
    if (params.has_glow > 0.5) {
        color += textureSampleLevel(t_glow, s_linear, in.uv, 0.0).rgb * params.glow_intensity;
    }
    return vec4<f32>(color, 1.0);
}
";

const HDR_WGSL: &str = r"
struct Params {
    previous_view_projection : mat4x4<f32>,
    exposure : f32,
    tone_mapping : f32,
    motion_blur_strength : f32,
    motion_blur_samples : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_scene : texture_2d<f32>;
@group(0) @binding(3) var t_position : texture_2d<f32>;
@group(0) @binding(4) var t_normal : texture_2d<f32>;

fn aces_filmic(x : vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return clamp((x * (a * x + b)) / (x * (c * x + d) + e), vec3<f32>(0.0), vec3<f32>(1.0));
}

fn neutral(color : vec3<f32>) -> vec3<f32> {
    let start = 0.8 - 0.04;
    let desaturation = 0.15;
    let x = min(color.r, min(color.g, color.b));
    let offset = select(0.04, x - 6.25 * x * x, x < 0.08);
    var c = color - offset;
    let peak = max(c.r, max(c.g, c.b));
    if (peak < start) {
        return c;
    }
    let d = 1.0 - start;
    let new_peak = 1.0 - d * d / (peak + d - start);
    c *= new_peak / peak;
    let g = 1.0 - 1.0 / (desaturation * (peak - new_peak) + 1.0);
    return mix(c, vec3<f32>(new_peak), g);
}

fn tone_map(c : vec3<f32>) -> vec3<f32> {
    if (params.tone_mapping < 0.5) {
        return clamp(c, vec3<f32>(0.0), vec3<f32>(1.0));
    } else if (params.tone_mapping < 1.5) {
        return c / (vec3<f32>(1.0) + c);
    } else if (params.tone_mapping < 2.5) {
        return aces_filmic(c);
    }
    return neutral(c);
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSampleLevel(t_scene, s_linear, in.uv, 0.0).rgb;

    let samples = i32(params.motion_blur_samples);
    if (params.motion_blur_strength > 0.0 && samples > 1) {
        let gdims = vec2<f32>(textureDimensions(t_position));
        let px = vec2<i32>(in.uv * gdims);
        let world = textureLoad(t_position, px, 0);
        var velocity = textureLoad(t_normal, px, 0).zw;
        if (world.w > 0.5) {
            let prev_uv = project_uv(params.previous_view_projection * vec4<f32>(world.xyz, 1.0));
            velocity += in.uv - prev_uv;
        }
        velocity *= params.motion_blur_strength;
        var sum = color;
        for (var i = 1; i < samples; i = i + 1) {
            let t = f32(i) / f32(samples);
            sum += textureSampleLevel(t_scene, s_linear, in.uv - velocity * t, 0.0).rgb;
        }
        color = sum / f32(samples);
    }

    return vec4<f32>(tone_map(color * params.exposure), 1.0);
}
";

const FXAA_WGSL: &str = r"
struct Params {
    inverse_resolution : vec2<f32>,
    subpixel : f32,
    edge_threshold : f32,
    iterations : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_source : texture_2d<f32>;

fn tap(uv : vec2<f32>) -> vec3<f32> {
    return textureSampleLevel(t_source, s_linear, uv, 0.0).rgb;
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let inv = params.inverse_resolution;
    let rgb_m = tap(in.uv);
    let luma_nw = luminance(tap(in.uv + vec2<f32>(-1.0, -1.0) * inv));
    let luma_ne = luminance(tap(in.uv + vec2<f32>( 1.0, -1.0) * inv));
    let luma_sw = luminance(tap(in.uv + vec2<f32>(-1.0,  1.0) * inv));
    let luma_se = luminance(tap(in.uv + vec2<f32>( 1.0,  1.0) * inv));
    let luma_m = luminance(rgb_m);

    let luma_min = min(luma_m, min(min(luma_nw, luma_ne), min(luma_sw, luma_se)));
    let luma_max = max(luma_m, max(max(luma_nw, luma_ne), max(luma_sw, luma_se)));
    if (luma_max - luma_min < max(0.0312, luma_max * params.edge_threshold)) {
        return vec4<f32>(rgb_m, 1.0);
    }

    var dir = vec2<f32>(
        -((luma_nw + luma_ne) - (luma_sw + luma_se)),
        (luma_nw + luma_sw) - (luma_ne + luma_se)
    );
    let dir_reduce = max((luma_nw + luma_ne + luma_sw + luma_se) * 0.25 * params.subpixel * 0.125, 1.0 / 128.0);
    let rcp_dir_min = 1.0 / (min(abs(dir.x), abs(dir.y)) + dir_reduce);
    dir = clamp(dir * rcp_dir_min, vec2<f32>(-params.iterations), vec2<f32>(params.iterations)) * inv;

    let rgb_a = 0.5 * (tap(in.uv + dir * (1.0 / 3.0 - 0.5)) + tap(in.uv + dir * (2.0 / 3.0 - 0.5)));
    let rgb_b = rgb_a * 0.5 + 0.25 * (tap(in.uv - dir * 0.5) + tap(in.uv + dir * 0.5));
    let luma_b = luminance(rgb_b);
    if (luma_b < luma_min || luma_b > luma_max) {
        return vec4<f32>(rgb_a, 1.0);
    }
    return vec4<f32>(rgb_b, 1.0);
}
";

const LENS_WGSL: &str = r"
struct Params {
    distortion : f32,
    cubic_distortion : f32,
    dispersion : f32,
    scale : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_source : texture_2d<f32>;

fn distort(uv : vec2<f32>, k_offset : f32) -> vec2<f32> {
    let c = uv - vec2<f32>(0.5);
    let r2 = dot(c, c);
    let f = 1.0 + r2 * (params.distortion + k_offset) + params.cubic_distortion * r2 * r2;
    return c * f / params.scale + vec2<f32>(0.5);
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let r = textureSampleLevel(t_source, s_linear, distort(in.uv, -params.dispersion), 0.0).r;
    let g = textureSampleLevel(t_source, s_linear, distort(in.uv, 0.0), 0.0).g;
    let b = textureSampleLevel(t_source, s_linear, distort(in.uv, params.dispersion), 0.0).b;
    return vec4<f32>(r, g, b, 1.0);
}
";

const FINALIZER_WGSL: &str = r"
struct Params {
    vignette_color : vec4<f32>,
    vignette_intensity : f32,
    vignette_smoothness : f32,
    lut_contribution : f32,
    has_lut : f32,
};

@group(0) @binding(0) var<uniform> params : Params;
@group(0) @binding(2) var t_source : texture_2d<f32>;
@group(0) @binding(3) var t_lut : texture_2d<f32>;

// The LUT is an unwrapped cube: N slices of N x N laid out horizontally.
fn apply_lut(color : vec3<f32>) -> vec3<f32> {
    let n = f32(textureDimensions(t_lut).y);
    let c = clamp(color, vec3<f32>(0.0), vec3<f32>(1.0));
    let blue = c.b * (n - 1.0);
    let s0 = floor(blue);
    let s1 = min(s0 + 1.0, n - 1.0);
    let xy = c.rg * (n - 1.0) + vec2<f32>(0.5);
    let uv0 = vec2<f32>((s0 * n + xy.x) / (n * n), xy.y / n);
    let uv1 = vec2<f32>((s1 * n + xy.x) / (n * n), xy.y / n);
    let a = textureSampleLevel(t_lut, s_linear, uv0, 0.0).rgb;
    let b = textureSampleLevel(t_lut, s_linear, uv1, 0.0).rgb;
    return mix(a, b, blue - s0);
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSampleLevel(t_source, s_linear, in.uv, 0.0).rgb;
    if (params.has_lut > 0.5) {
        color = mix(color, apply_lut(color), params.lut_contribution);
    }
    let d = distance(in.uv, vec2<f32>(0.5)) * 1.41421356;
    let falloff = smoothstep(1.0 - params.vignette_smoothness, 1.0, d);
    color = mix(color, params.vignette_color.rgb, falloff * params.vignette_intensity);
    return vec4<f32>(color, 1.0);
}
";

// ============================================================================
// Registry
// ============================================================================

pub const BUILTIN_PROGRAMS: &[BuiltinProgram] = &[
    BuiltinProgram {
        name: "deferred_environment",
        body: ENVIRONMENT_WGSL,
        uniforms: &[
            ("inverse_view_projection", Mat4),
            ("view_projection", Mat4),
            ("camera_position", Vec3),
            ("ambient_intensity", Float),
            ("ambient_color", Vec3),
            ("has_environment_map", Float),
            ("ssao_enabled", Float),
            ("ssao_radius", Float),
            ("ssao_bias", Float),
            ("ssao_intensity", Float),
            ("ssao_samples", Float),
        ],
        textures: &[float(0), float(1), float(2), depth(3), cube(4)],
    },
    BuiltinProgram {
        name: "deferred_light",
        body: LIGHT_WGSL,
        uniforms: &[
            ("camera_position", Vec3),
            ("light_type", Float),
            ("light_color", Vec3),
            ("light_intensity", Float),
            ("light_position", Vec3),
            ("light_range", Float),
            ("light_direction", Vec3),
            ("inner_cone_cos", Float),
            ("outer_cone_cos", Float),
            ("has_shadow", Float),
            ("shadow_bias", Float),
            ("shadow_view_projection", Mat4),
        ],
        textures: &[float(0), float(1), float(2), depth(3), depth(4)],
    },
    BuiltinProgram {
        name: "blur",
        body: BLUR_WGSL,
        uniforms: &[("direction", Vec2), ("radius", Float), ("threshold", Float)],
        textures: &[float(0)],
    },
    BuiltinProgram {
        name: "hdr_prepass",
        body: HDR_PREPASS_WGSL,
        uniforms: &[("glow_intensity", Float), ("has_glow", Float)],
        textures: &[float(0), float(1)],
    },
    BuiltinProgram {
        name: "hdr",
        body: HDR_WGSL,
        uniforms: &[
            ("previous_view_projection", Mat4),
            ("exposure", Float),
            ("tone_mapping", Float),
            ("motion_blur_strength", Float),
            ("motion_blur_samples", Float),
        ],
        textures: &[float(0), float(1), float(2)],
    },
    BuiltinProgram {
        name: "fxaa",
        body: FXAA_WGSL,
        uniforms: &[
            ("inverse_resolution", Vec2),
            ("subpixel", Float),
            ("edge_threshold", Float),
            ("iterations", Float),
        ],
        textures: &[float(0)],
    },
    BuiltinProgram {
        name: "lens",
        body: LENS_WGSL,
        uniforms: &[
            ("distortion", Float),
            ("cubic_distortion", Float),
            ("dispersion", Float),
            ("scale", Float),
        ],
        textures: &[float(0)],
    },
    BuiltinProgram {
        name: "finalizer",
        body: FINALIZER_WGSL,
        uniforms: &[
            ("vignette_color", Vec4),
            ("vignette_intensity", Float),
            ("vignette_smoothness", Float),
            ("lut_contribution", Float),
            ("has_lut", Float),
        ],
        textures: &[float(0), float(1)],
    },
];
