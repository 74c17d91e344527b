//! Cubemap Capture Tests
//!
//! Tests for:
//! - Refusal to render into the active environment map
//! - Six-face capture with per-face shadows and a single simulation peek
//! - Transient vs. persistent capture targets, and their size and format checks
//! - Mip chain invalidation and regeneration on sample

mod common;

use glam::Vec3;

use common::*;
use gloam::renderer::cubemap::CubemapRenderTarget;
use gloam::renderer::gpu::headless::GpuCommand;
use gloam::renderer::gpu::{ColorFormat, CubeFace, GraphicsContext};
use gloam::scene::{Environment, Light};
use gloam::{CubemapCapture, GloamError, HeadlessContext};

const CUBE: u32 = 64;

fn cubemap(gfx: &mut dyn GraphicsContext) -> gloam::renderer::gpu::CubemapId {
    gfx.create_cubemap("Probe", CUBE, ColorFormat::Rgba16Float)
        .unwrap()
}

// ============================================================================
// Feedback Guard
// ============================================================================

#[test]
fn capture_into_the_environment_map_is_refused() {
    capture_warnings();
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    gfx.take_commands();
    let mut scene = TestScene::new();
    scene.environment = Environment::new().with_environment_map(probe);

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);

    assert_eq!(result, CubemapCapture::RefusedFeedbackLoop);
    assert!(gfx.commands().is_empty());
    assert!(scene.peeks.is_empty());
    assert_eq!(scene.lights.shadow_updates, 0);
    assert_eq!(warnings().len(), 1);
    assert!(gfx.cubemap_mips_valid(probe));
}

#[test]
fn capture_into_another_cubemap_is_allowed() {
    let (mut gfx, mut renderer) = setup();
    let environment = cubemap(&mut gfx);
    let probe = cubemap(&mut gfx);
    let mut scene = TestScene::new();
    scene.environment = Environment::new().with_environment_map(environment);

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);

    assert_eq!(result, CubemapCapture::Captured);
    // The environment map is sampled while the probe is written.
    assert!(gfx.cubemap_mips_valid(environment));
    assert!(!gfx.cubemap_mips_valid(probe));
}

// ============================================================================
// Capture
// ============================================================================

#[test]
fn capture_renders_all_six_faces() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let mut scene = TestScene::new().with_light(Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 5.0));
    let live = gfx.live_targets();

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);

    assert_eq!(result, CubemapCapture::Captured);
    for face in CubeFace::ALL {
        assert!(gfx.face_draw_count(probe, face) > 0, "{face:?} was not drawn");
    }
    assert_eq!(scene.lights.shadow_updates, 6);
    assert_eq!(scene.lights.shadow_renders, 0);
    assert_eq!(scene.peeks, vec![renderer.settings().capture_step]);
    assert_eq!(gfx.live_targets(), live);
    assert!(gfx.is_idle());
}

#[test]
fn capture_draws_every_layer_once_per_face() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let mut scene = TestScene::new();

    renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::new(0.0, 1.0, 0.0), probe, None);

    use gloam::scene::EntityLayer::*;
    for layer in [Opaque, Decal, Background, Transparent] {
        assert_eq!(scene.draws_of(layer).len(), 6, "{layer:?}");
    }
    // Overlays belong to the screen only.
    assert!(scene.draws_of(Overlay).is_empty());
    assert_eq!(scene.particles.renders.get(), 6);
}

#[test]
fn capture_invalidates_mips_and_flushes() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let mut scene = TestScene::new();
    assert!(gfx.cubemap_mips_valid(probe));

    renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);

    assert!(!gfx.cubemap_mips_valid(probe));
    let invalidate = gfx
        .position(|c| matches!(c, GpuCommand::InvalidateCubemapMips(id) if *id == probe))
        .unwrap();
    let flush = gfx.position(|c| matches!(c, GpuCommand::Flush)).unwrap();
    let last_detach = gfx
        .commands()
        .iter()
        .rposition(|c| matches!(c, GpuCommand::DetachCubeFace(_)))
        .unwrap();
    assert!(last_detach < invalidate);
    assert!(invalidate < flush);
    assert!(!gfx.commands().iter().any(|c| matches!(c, GpuCommand::BeginFrame)));
}

#[test]
fn sampling_the_capture_rebuilds_its_mips() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let mut scene = TestScene::new();
    renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);
    assert!(!gfx.cubemap_mips_valid(probe));

    scene.environment = Environment::new().with_environment_map(probe);
    renderer.render(&mut gfx, &mut scene, &window());

    assert!(gfx.cubemap_mips_valid(probe));
}

// ============================================================================
// Capture Targets
// ============================================================================

#[test]
fn persistent_target_is_reused() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let target = CubemapRenderTarget::new(&mut gfx, CUBE, ColorFormat::Rgba16Float).unwrap();
    let mut scene = TestScene::new();
    gfx.take_commands();

    for _ in 0..2 {
        let result =
            renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, Some(&target));
        assert_eq!(result, CubemapCapture::Captured);
    }

    let creations = gfx
        .commands()
        .iter()
        .filter(|c| matches!(c, GpuCommand::CreateTarget { .. } | GpuCommand::DestroyTarget(_)))
        .count();
    assert_eq!(creations, 0);
    assert_eq!(scene.peeks.len(), 2);
    assert!(gfx.target_size(target.resolve_target().id()).is_some());
    target.release(&mut gfx);
}

#[test]
fn mismatched_target_size_fails() {
    capture_warnings();
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let target = CubemapRenderTarget::new(&mut gfx, CUBE / 2, ColorFormat::Rgba16Float).unwrap();
    let mut scene = TestScene::new();
    gfx.take_commands();

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, Some(&target));

    assert_eq!(result, CubemapCapture::Failed);
    assert!(gfx.commands().is_empty());
    assert!(scene.peeks.is_empty());
    assert_eq!(warnings().len(), 1);
}

#[test]
fn transient_target_follows_the_cubemap_format() {
    let (mut gfx, mut renderer) = setup();
    let probe = gfx.create_cubemap("Probe", CUBE, ColorFormat::Rgba8Unorm).unwrap();
    let mut scene = TestScene::new();
    let live = gfx.live_targets();

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);

    assert_eq!(result, CubemapCapture::Captured);
    for face in CubeFace::ALL {
        assert!(gfx.face_draw_count(probe, face) > 0, "{face:?} was not drawn");
    }
    assert!(!gfx.cubemap_mips_valid(probe));
    assert_eq!(gfx.live_targets(), live);
}

#[test]
fn mismatched_target_format_fails() {
    capture_warnings();
    let (mut gfx, mut renderer) = setup();
    let probe = gfx.create_cubemap("Probe", CUBE, ColorFormat::Rgba8Unorm).unwrap();
    let target = CubemapRenderTarget::new(&mut gfx, CUBE, ColorFormat::Rgba16Float).unwrap();
    let mut scene = TestScene::new();
    gfx.take_commands();

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, Some(&target));

    assert_eq!(result, CubemapCapture::Failed);
    assert!(gfx.commands().is_empty());
    assert!(scene.peeks.is_empty());
    assert!(gfx.cubemap_mips_valid(probe));
    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("Rgba8Unorm"), "{}", warnings[0]);
    target.release(&mut gfx);
}

#[test]
fn attaching_a_face_of_another_format_is_rejected() {
    let mut gfx = HeadlessContext::new(SIZE);
    let probe = gfx.create_cubemap("Probe", CUBE, ColorFormat::Rgba8Unorm).unwrap();
    let target = CubemapRenderTarget::new(&mut gfx, CUBE, ColorFormat::Rgba16Float).unwrap();
    assert!(!target.fits(&gfx, probe));

    let result = target.attach(&mut gfx, probe, CubeFace::PositiveX);

    assert!(matches!(result, Err(GloamError::IncompleteTarget { .. })));
    assert!(
        !gfx.commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::AttachCubeFace { .. }))
    );
    assert_eq!(gfx.face_draw_count(probe, CubeFace::PositiveX), 0);
}

#[test]
fn unknown_cubemap_fails() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    gfx.destroy_cubemap(probe);
    let mut scene = TestScene::new();

    let result = renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);

    assert_eq!(result, CubemapCapture::Failed);
    assert!(scene.peeks.is_empty());
}

#[test]
fn capture_between_frames_leaves_frames_intact() {
    let (mut gfx, mut renderer) = setup();
    let probe = cubemap(&mut gfx);
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());
    renderer.render_to_cubemap(&mut gfx, &mut scene, Vec3::ZERO, probe, None);
    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &window());

    assert_eq!(renderer.last_frame_stats().post_filter_invocations, 3);
    assert_eq!(gfx.draws_with_program("finalizer"), 1);
}
