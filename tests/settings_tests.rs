//! Settings & Configuration Tests
//!
//! Tests for:
//! - Validation on configure (rejection keeps the previous group)
//! - Each group reaches the pass or filter that consumes it
//! - LUT and vignette uniforms of the finalizer
//! - Shader parameter lookup and type checks
//! - Construction failures (bad settings, missing programs)

mod common;

use glam::{UVec2, Vec3, Vec4};

use common::*;
use gloam::renderer::gpu::headless::GpuCommand;
use gloam::renderer::gpu::{ColorFormat, TextureRef, UniformKind, UniformValue};
use gloam::renderer::shader::ShaderParameters;
use gloam::resources::{
    AntiAliasingSettings, FxaaQuality, GlowSettings, LensSettings, LutSettings,
    MotionBlurSettings, SsaoSettings, ToneMappingMode, VignetteSettings,
};
use gloam::{GloamError, HeadlessContext, RenderOption, Renderer, RendererSettings};

fn float(value: f32) -> Option<UniformValue> {
    Some(UniformValue::Float(value))
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn rejected_group_keeps_previous_settings() {
    capture_warnings();
    let (_gfx, mut renderer) = setup();
    let before = renderer.vignette().clone();

    let mut vignette = before.clone();
    vignette.smoothness = 0.0;
    let result = renderer.configure(RenderOption::Vignette(vignette));

    assert!(matches!(
        result,
        Err(GloamError::InvalidSetting {
            group: "vignette",
            ..
        })
    ));
    assert_eq!(renderer.vignette(), &before);
    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("vignette"), "{}", warnings[0]);
}

#[test]
fn every_group_validates() {
    let (_gfx, mut renderer) = setup();

    let mut ssao = SsaoSettings::default();
    ssao.set_radius(-1.0);
    let mut hdr = renderer.hdr().clone();
    hdr.set_luminance_range(2.0, 1.0);
    let mut glow = GlowSettings::default();
    glow.set_spread(0.0);
    let motion_blur = MotionBlurSettings {
        samples: 0,
        ..MotionBlurSettings::default()
    };
    let mut lut = LutSettings::default();
    lut.set_contribution(1.5);
    let vignette = VignetteSettings {
        intensity: -0.1,
        ..VignetteSettings::default()
    };
    let mut aa = AntiAliasingSettings::default();
    aa.set_subpixel(-1.0);
    let lens = LensSettings {
        scale: 0.0,
        ..LensSettings::default()
    };

    let rejected = [
        RenderOption::Ssao(ssao),
        RenderOption::Hdr(hdr),
        RenderOption::Glow(glow),
        RenderOption::MotionBlur(motion_blur),
        RenderOption::Lut(lut),
        RenderOption::Vignette(vignette),
        RenderOption::AntiAliasing(aa),
        RenderOption::Lens(lens),
    ];
    for option in rejected {
        let group = option.group();
        assert!(renderer.configure(option).is_err(), "{group} accepted invalid values");
    }
}

#[test]
fn glow_radius_is_capped() {
    let mut glow = GlowSettings::default();
    glow.set_radius(1000);
    assert_eq!(glow.radius(), gloam::resources::glow::MAX_GLOW_RADIUS);
    assert!(glow.validate().is_ok());
}

#[test]
fn low_precision_scene_format_is_rejected() {
    let mut gfx = HeadlessContext::new(SIZE);
    let settings = RendererSettings {
        hdr_format: ColorFormat::Rgba8Unorm,
        ..RendererSettings::default()
    };

    let result = Renderer::new(&mut gfx, &window(), settings);

    assert!(matches!(result, Err(GloamError::InvalidSetting { .. })));
    assert_eq!(gfx.live_targets(), 1);
}

#[test]
fn non_rgba_float_scene_formats_are_rejected() {
    for format in [ColorFormat::Rg16Float, ColorFormat::R16Float] {
        let settings = RendererSettings {
            hdr_format: format,
            ..RendererSettings::default()
        };
        assert!(
            matches!(settings.validate(), Err(GloamError::InvalidSetting { .. })),
            "{format:?} accepted"
        );
    }
    let wide = RendererSettings {
        hdr_format: ColorFormat::Rgba32Float,
        ..RendererSettings::default()
    };
    assert!(wide.validate().is_ok());
}

// ============================================================================
// Forwarding
// ============================================================================

#[test]
fn configured_groups_reach_their_shaders() -> anyhow::Result<()> {
    let (mut gfx, mut renderer) = setup();

    let mut ssao = renderer.ssao().clone();
    ssao.set_radius(1.25);
    renderer.configure(RenderOption::Ssao(ssao))?;

    let mut hdr = renderer.hdr().clone();
    hdr.mode = ToneMappingMode::Reinhard;
    hdr.auto_exposure = false;
    renderer.configure(RenderOption::Hdr(hdr))?;

    let mut glow = renderer.glow().clone();
    glow.set_intensity(0.25);
    renderer.configure(RenderOption::Glow(glow))?;

    let mut aa = renderer.antialiasing().clone();
    aa.set_quality(FxaaQuality::High);
    renderer.configure(RenderOption::AntiAliasing(aa))?;

    let lens = LensSettings {
        enabled: true,
        dispersion: 0.02,
        ..LensSettings::default()
    };
    renderer.configure(RenderOption::Lens(lens))?;

    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());

    assert_eq!(gfx.uniform("deferred_environment", "ssao_radius"), float(1.25));
    assert_eq!(gfx.uniform("hdr", "tone_mapping"), float(1.0));
    assert_eq!(gfx.uniform("hdr_prepass", "glow_intensity"), float(0.25));
    assert_eq!(
        gfx.uniform("fxaa", "iterations"),
        float(FxaaQuality::High.iterations() as f32)
    );
    assert_eq!(gfx.uniform("lens", "dispersion"), float(0.02));
    Ok(())
}

#[test]
fn disabled_ssao_is_uploaded_as_off() -> anyhow::Result<()> {
    let (mut gfx, mut renderer) = setup();
    let mut ssao = renderer.ssao().clone();
    ssao.set_enabled(false);
    renderer.configure(RenderOption::Ssao(ssao))?;
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    assert_eq!(gfx.uniform("deferred_environment", "ssao_enabled"), float(0.0));
    Ok(())
}

#[test]
fn environment_uniforms_follow_the_scene() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    scene.environment.ambient_color = Vec3::new(0.1, 0.2, 0.3);
    scene.environment.intensity = 0.5;

    renderer.render(&mut gfx, &mut scene, &window());

    assert_eq!(
        gfx.uniform("deferred_environment", "ambient_color"),
        Some(UniformValue::Vec3(Vec3::new(0.1, 0.2, 0.3)))
    );
    assert_eq!(gfx.uniform("deferred_environment", "ambient_intensity"), float(0.5));
    assert_eq!(gfx.uniform("deferred_environment", "has_environment_map"), float(0.0));
}

// ============================================================================
// Finalizer
// ============================================================================

#[test]
fn lut_is_bound_on_the_second_unit() -> anyhow::Result<()> {
    let (mut gfx, mut renderer) = setup();
    let lut_texture = gfx.register_texture(UVec2::new(256, 16));
    renderer
        .configure(RenderOption::Lut(LutSettings::with_texture(lut_texture)))?;
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let finalizer = gfx.program_id("finalizer").unwrap();
    let textures = gfx
        .commands()
        .iter()
        .find_map(|c| match c {
            GpuCommand::Draw {
                program, textures, ..
            } if *program == finalizer => Some(textures.clone()),
            _ => None,
        })
        .unwrap();
    assert!(textures.contains(&(1, TextureRef::External(lut_texture))));
    assert_eq!(gfx.uniform("finalizer", "has_lut"), float(1.0));
    assert!(renderer.lut().is_enabled());
    Ok(())
}

#[test]
fn without_lut_nothing_is_bound_on_the_second_unit() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let finalizer = gfx.program_id("finalizer").unwrap();
    let units: Vec<u32> = gfx
        .commands()
        .iter()
        .find_map(|c| match c {
            GpuCommand::Draw {
                program, textures, ..
            } if *program == finalizer => Some(textures.iter().map(|(u, _)| *u).collect()),
            _ => None,
        })
        .unwrap();
    assert_eq!(units, vec![0]);
    assert_eq!(gfx.uniform("finalizer", "has_lut"), float(0.0));
}

#[test]
fn vignette_intensity_is_zero_when_disabled() -> anyhow::Result<()> {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(gfx.uniform("finalizer", "vignette_intensity"), float(0.0));

    let vignette = VignetteSettings {
        enabled: true,
        intensity: 0.4,
        color: Vec4::new(0.1, 0.0, 0.0, 1.0),
        ..VignetteSettings::default()
    };
    renderer.configure(RenderOption::Vignette(vignette))?;
    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(gfx.uniform("finalizer", "vignette_intensity"), float(0.4));
    assert_eq!(
        gfx.uniform("finalizer", "vignette_color"),
        Some(UniformValue::Vec4(Vec4::new(0.1, 0.0, 0.0, 1.0)))
    );
    Ok(())
}

// ============================================================================
// Shader Parameters
// ============================================================================

#[test]
fn unknown_parameter_is_reported_and_ignored() {
    capture_warnings();
    let mut params = ShaderParameters::new().with("exposure", 1.0);

    assert!(!params.set("exposre", 2.0));
    assert!(params.param("missing").is_null());

    assert_eq!(params.get("exposure"), float(1.0));
    assert_eq!(warnings().len(), 2);
}

#[test]
fn mistyped_parameter_is_reported_and_ignored() {
    capture_warnings();
    let mut params = ShaderParameters::new().with("tint", Vec3::ONE);

    assert!(!params.set("tint", 0.5));

    assert_eq!(params.get("tint"), Some(UniformValue::Vec3(Vec3::ONE)));
    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("tint"));
}

#[test]
fn program_interface_limits_uploads() -> anyhow::Result<()> {
    let mut gfx = HeadlessContext::new(SIZE);
    gfx.register_program("finalizer", &[("has_lut", UniformKind::Float)]);
    let mut renderer = Renderer::new(&mut gfx, &window(), RendererSettings::default())?;
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    // Undeclared names are dropped; the draw still happens.
    assert_eq!(gfx.draws_with_program("finalizer"), 1);
    assert_eq!(gfx.uniform("finalizer", "has_lut"), float(0.0));
    assert!(gfx.uniform("finalizer", "vignette_intensity").is_none());
    Ok(())
}

// ============================================================================
// Program Failures
// ============================================================================

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "GPU object validation failed")]
fn missing_program_asserts_in_debug() {
    let mut gfx = HeadlessContext::new(SIZE);
    gfx.set_strict_programs(true);
    let _ = Renderer::new(&mut gfx, &window(), RendererSettings::default());
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "GPU object validation failed")]
fn unlinkable_program_asserts_in_debug() {
    let mut gfx = HeadlessContext::new(SIZE);
    gfx.fail_program("fxaa");
    let _ = Renderer::new(&mut gfx, &window(), RendererSettings::default());
}

#[test]
#[cfg(not(debug_assertions))]
fn unlinkable_program_fails_construction() {
    let mut gfx = HeadlessContext::new(SIZE);
    gfx.fail_program("fxaa");
    let result = Renderer::new(&mut gfx, &window(), RendererSettings::default());
    assert!(matches!(result, Err(GloamError::ProgramLink { .. })));
    assert_eq!(gfx.live_targets(), 1);
}
