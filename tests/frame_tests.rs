//! Frame Orchestration Tests
//!
//! Tests for:
//! - Pass order of a full frame (pre-step → resolve → swap → exposure → glow → chain → finalizer)
//! - Which target each entity layer is drawn into
//! - A frame with every optional stage disabled
//! - Frame statistics and light culling
//! - Skipped frames, resize (and its retry after a failure) and release
//! - Warning on a renderer dropped without release
//! - Scoped binding on early return and unwind

mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};

use glam::{UVec2, Vec3, Vec4};

use common::*;
use gloam::renderer::gpu::headless::GpuCommand;
use gloam::renderer::gpu::{
    ClearValue, ColorFormat, GraphicsContext, TargetDesc, TextureRef,
};
use gloam::renderer::post::InputSource;
use gloam::renderer::target::RenderTarget;
use gloam::renderer::window::FrameWindow;
use gloam::scene::{EntityLayer, Light, RenderDimension};
use gloam::{HeadlessContext, RenderOption};

fn first_draw_with(gfx: &HeadlessContext, program: &str) -> usize {
    let id = gfx
        .program_id(program)
        .unwrap_or_else(|| panic!("program '{program}' was never used"));
    gfx.position(|c| matches!(c, GpuCommand::Draw { program: p, .. } if *p == id))
        .unwrap_or_else(|| panic!("no draw with '{program}'"))
}

fn index_of(gfx: &HeadlessContext, what: &str, pred: impl Fn(&GpuCommand) -> bool) -> usize {
    gfx.position(pred)
        .unwrap_or_else(|| panic!("command not recorded: {what}"))
}

/// The `Draw` command of the (single) draw with `program`.
fn draw_with(gfx: &HeadlessContext, program: &str) -> GpuCommand {
    gfx.commands()[first_draw_with(gfx, program)].clone()
}

fn disable_optional_stages(renderer: &mut gloam::Renderer) {
    let mut glow = renderer.glow().clone();
    glow.set_enabled(false);
    renderer.configure(RenderOption::Glow(glow)).unwrap();

    let mut hdr = renderer.hdr().clone();
    hdr.enabled = false;
    renderer.configure(RenderOption::Hdr(hdr)).unwrap();

    let mut aa = renderer.antialiasing().clone();
    aa.set_enabled(false);
    renderer.configure(RenderOption::AntiAliasing(aa)).unwrap();

    assert!(!renderer.motion_blur().enabled);
    assert!(!renderer.lens().enabled);
}

// ============================================================================
// Pass Order
// ============================================================================

#[test]
fn frame_runs_passes_in_order() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new().with_light(Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 2.0));

    renderer.render(&mut gfx, &mut scene, &window());

    let gbuffer = renderer.gbuffer().target().id();
    let scene_id = renderer.scene_target().id();
    let screen = gfx.screen();

    let order = [
        index_of(&gfx, "begin frame", |c| matches!(c, GpuCommand::BeginFrame)),
        index_of(&gfx, "G-buffer clear", |c| {
            matches!(c, GpuCommand::Clear { target, .. } if *target == gbuffer)
        }),
        index_of(&gfx, "scene clear", |c| {
            matches!(c, GpuCommand::Clear { target, .. } if *target == scene_id)
        }),
        index_of(&gfx, "depth blit", |c| {
            matches!(c, GpuCommand::BlitDepth { src, dst } if *src == gbuffer && *dst == scene_id)
        }),
        first_draw_with(&gfx, "deferred_environment"),
        first_draw_with(&gfx, "deferred_light"),
        index_of(&gfx, "swap", |c| matches!(c, GpuCommand::SwapColor(t) if *t == scene_id)),
        index_of(&gfx, "luminance mips", |c| {
            matches!(c, GpuCommand::GenerateLuminanceMips(t) if *t == scene_id)
        }),
        index_of(&gfx, "luminance read", |c| matches!(c, GpuCommand::ReadLuminance { .. })),
        first_draw_with(&gfx, "blur"),
        first_draw_with(&gfx, "hdr_prepass"),
        first_draw_with(&gfx, "hdr"),
        first_draw_with(&gfx, "fxaa"),
        first_draw_with(&gfx, "finalizer"),
        index_of(&gfx, "end frame", |c| matches!(c, GpuCommand::EndFrame)),
    ];
    for pair in order.windows(2) {
        assert!(pair[0] < pair[1], "passes out of order: {order:?}");
    }

    let GpuCommand::Draw { target, .. } = draw_with(&gfx, "finalizer") else {
        unreachable!()
    };
    assert_eq!(target, screen, "finalizer must write the screen");
    assert!(gfx.is_idle(), "frame left a target or program bound");
}

#[test]
fn entity_layers_go_to_their_targets() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let gbuffer = renderer.gbuffer().target().id();
    let decals = renderer.gbuffer().decal_target().id();
    let scene_id = renderer.scene_target().id();
    let screen = gfx.screen();

    let expect = [
        (EntityLayer::Opaque, RenderDimension::ThreeD, gbuffer),
        (EntityLayer::Decal, RenderDimension::ThreeD, decals),
        (EntityLayer::Background, RenderDimension::ThreeD, scene_id),
        (EntityLayer::Transparent, RenderDimension::ThreeD, scene_id),
        (EntityLayer::Overlay, RenderDimension::TwoD, screen),
    ];
    let draws = scene.draws.borrow();
    assert_eq!(draws.len(), expect.len());
    for (draw, (layer, dimension, target)) in draws.iter().zip(expect) {
        assert_eq!(draw.layer, layer);
        assert_eq!(draw.dimension, dimension);
        assert_eq!(draw.target, Some(target), "{layer:?} drawn into the wrong target");
    }

    assert_eq!(scene.particles.renders.get(), 1);
    assert_eq!(*scene.particles.targets.borrow(), vec![Some(scene_id)]);
    assert_eq!(scene.lights.shadow_renders, 1);
    assert_eq!(scene.lights.shadow_updates, 0);
}

#[test]
fn decals_render_without_depth_test_or_writes() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());

    let decals = renderer.gbuffer().decal_target().id();
    let commands = gfx.commands();
    let bind = commands
        .iter()
        .position(|c| matches!(c, GpuCommand::BindTarget(t) if *t == decals))
        .unwrap();
    let state: Vec<_> = commands[bind..]
        .iter()
        .take_while(|c| !matches!(c, GpuCommand::UnbindTarget(_)))
        .cloned()
        .collect();
    assert!(state.contains(&GpuCommand::SetDepthTest(false)));
    assert!(state.contains(&GpuCommand::SetDepthWrite(false)));
}

// ============================================================================
// Everything Disabled
// ============================================================================

#[test]
fn frame_with_all_filters_disabled_still_reaches_the_screen() {
    let (mut gfx, mut renderer) = setup();
    disable_optional_stages(&mut renderer);
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let stats = renderer.last_frame_stats();
    assert_eq!(stats.post_filter_invocations, 0);
    assert_eq!(stats.blur_iterations, 0);

    for program in ["blur", "hdr_prepass", "hdr", "fxaa", "lens"] {
        assert_eq!(gfx.draws_with_program(program), 0, "'{program}' ran while disabled");
    }
    assert!(gfx.draws_with_program("deferred_environment") > 0);
    assert_eq!(gfx.draws_with_program("finalizer"), 1);

    // Without auto-exposure nothing is read back.
    assert!(gfx.position(|c| matches!(c, GpuCommand::ReadLuminance { .. })).is_none());

    let GpuCommand::Draw { target, textures, .. } = draw_with(&gfx, "finalizer") else {
        unreachable!()
    };
    assert_eq!(target, gfx.screen());
    assert_eq!(textures[0], (0, renderer.scene_target().color()));
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn default_frame_statistics() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new()
        .with_light(Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 2.0))
        .with_light(Light::new_point(Vec3::ONE, 1.0, Vec3::new(500.0, 0.0, 0.0), 1.0))
        .with_light(Light::new_directional(Vec3::ONE, 1.0, Vec3::NEG_Y));

    renderer.render(&mut gfx, &mut scene, &window());

    let stats = renderer.last_frame_stats();
    // Glow prepass, HDR, FXAA. Lens and motion blur are off by default.
    assert_eq!(stats.post_filter_invocations, 3);
    assert_eq!(stats.blur_iterations, renderer.glow().radius());
    assert_eq!(stats.lights_drawn, 2);
    assert_eq!(stats.lights_culled, 1);
    assert_eq!(gfx.draws_with_program("deferred_light"), 2);
}

#[test]
fn point_light_is_scissored() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new().with_light(Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 1.0));
    renderer.render(&mut gfx, &mut scene, &window());

    let GpuCommand::Draw { state, .. } = draw_with(&gfx, "deferred_light") else {
        unreachable!()
    };
    let scissor = state.scissor.expect("a bounded light draws with a scissor");
    assert!(scissor.width < SIZE.x && scissor.height < SIZE.y);
}

// ============================================================================
// Frame Lifecycle
// ============================================================================

#[test]
fn failed_begin_frame_skips_the_frame() {
    capture_warnings();
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();

    gfx.fail_next_frame();
    renderer.render(&mut gfx, &mut scene, &window());

    assert!(gfx.commands().is_empty());
    assert!(scene.draws.borrow().is_empty());
    assert_eq!(warnings().len(), 1);

    // The next frame renders normally.
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(gfx.draws_with_program("finalizer"), 1);
}

#[test]
fn zero_sized_window_skips_the_frame() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &FrameWindow::new(UVec2::new(0, 180), DT));
    assert!(gfx.commands().is_empty());
    assert_eq!(renderer.size(), SIZE);
}

#[test]
fn window_resize_reallocates_buffers() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());
    let live = gfx.live_targets();
    let old_scene = *renderer.scene_target();

    let size = UVec2::new(640, 360);
    renderer.render(&mut gfx, &mut scene, &FrameWindow::new(size, DT));

    assert_eq!(renderer.size(), size);
    assert_eq!(gfx.screen_size(), size);
    assert_eq!(renderer.scene_target().size(), size);
    assert_eq!(renderer.gbuffer().size(), size);
    assert_eq!(gfx.live_targets(), live, "old buffers leaked or new ones missing");
    assert!(gfx.target_size(old_scene.id()).is_none());

    let stages = renderer.builtin_stages();
    assert_eq!(
        renderer.chain().input(stages.hdr_prepass),
        Some(InputSource::SceneColor)
    );
    let hdr_output = renderer.chain().output_target(stages.hdr).unwrap();
    assert_eq!(hdr_output.size(), size);
}

#[test]
fn release_destroys_every_owned_target() {
    let mut gfx = HeadlessContext::new(SIZE);
    let before = gfx.live_targets();
    let renderer = gloam::Renderer::new(&mut gfx, &window(), Default::default()).unwrap();
    assert!(gfx.live_targets() > before);

    renderer.release(&mut gfx);
    assert_eq!(gfx.live_targets(), before);
}

#[test]
fn failed_resize_is_retried_next_frame() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    let live = gfx.live_targets();
    let hdr = renderer.builtin_stages().hdr;
    let size = SIZE * 2;
    let resized = FrameWindow::new(size, DT);

    gfx.fail_next_target("HDR Output");
    renderer.render(&mut gfx, &mut scene, &resized);
    assert_eq!(renderer.size(), SIZE);
    assert!(renderer.chain().output_target(hdr).is_none());

    renderer.render(&mut gfx, &mut scene, &resized);
    assert_eq!(renderer.size(), size);
    assert_eq!(renderer.chain().output_target(hdr).unwrap().size(), size);
    assert_eq!(renderer.scene_target().size(), size);
    assert_eq!(gfx.live_targets(), live);
}

#[test]
fn dropping_without_release_warns() {
    capture_warnings();
    let (_gfx, renderer) = setup();

    drop(renderer);

    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("release"), "{}", warnings[0]);
}

#[test]
fn released_renderer_drops_silently() {
    capture_warnings();
    let (mut gfx, renderer) = setup();

    renderer.release(&mut gfx);

    assert!(warnings().is_empty());
}

// ============================================================================
// Scoped Binding
// ============================================================================

fn clear_unless(gfx: &mut dyn GraphicsContext, target: &RenderTarget, bail: bool) -> Option<()> {
    let mut scope = target.bind(gfx);
    if bail {
        return None;
    }
    scope.clear(ClearValue::color(Vec4::ONE));
    Some(())
}

#[test]
fn target_scope_unbinds_on_early_return() {
    let mut gfx = HeadlessContext::new(SIZE);
    let desc = TargetDesc::color("scratch", SIZE, ColorFormat::Rgba8Unorm);
    let target = RenderTarget::new(&mut gfx, &desc).unwrap();

    assert!(clear_unless(&mut gfx, &target, true).is_none());
    assert_eq!(gfx.bound_target(), None);
    assert_eq!(
        gfx.commands().last(),
        Some(&GpuCommand::UnbindTarget(target.id()))
    );
}

#[test]
fn target_scope_unbinds_on_unwind() {
    let mut gfx = HeadlessContext::new(SIZE);
    let desc = TargetDesc::color("scratch", SIZE, ColorFormat::Rgba8Unorm);
    let target = RenderTarget::new(&mut gfx, &desc).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _scope = target.bind(&mut gfx);
        panic!("pass failed");
    }));
    assert!(result.is_err());
    assert_eq!(gfx.bound_target(), None);
}

#[test]
fn nested_scopes_unbind_innermost_first() {
    let mut gfx = HeadlessContext::new(SIZE);
    let outer = RenderTarget::new(&mut gfx, &TargetDesc::color("outer", SIZE, ColorFormat::Rgba8Unorm))
        .unwrap();
    let inner = RenderTarget::new(&mut gfx, &TargetDesc::color("inner", SIZE, ColorFormat::Rgba8Unorm))
        .unwrap();
    gfx.take_commands();
    {
        let mut a = outer.bind(&mut gfx);
        let b = inner.bind(&mut *a);
        assert_eq!(b.bound_target(), Some(inner.id()));
    }
    assert_eq!(
        gfx.take_commands(),
        vec![
            GpuCommand::BindTarget(outer.id()),
            GpuCommand::BindTarget(inner.id()),
            GpuCommand::UnbindTarget(inner.id()),
            GpuCommand::UnbindTarget(outer.id()),
        ]
    );
}

// ============================================================================
// Double Buffering
// ============================================================================

#[test]
fn double_swap_restores_front_and_back() {
    let mut gfx = HeadlessContext::new(SIZE);
    let desc = TargetDesc::color("history", SIZE, ColorFormat::Rgba16Float).double_buffered();
    let target = RenderTarget::new(&mut gfx, &desc).unwrap();
    let front = gfx.front_attachment(target.id());

    target.swap(&mut gfx);
    assert_ne!(gfx.front_attachment(target.id()), front);
    target.swap(&mut gfx);
    assert_eq!(gfx.front_attachment(target.id()), front);
}

#[test]
fn written_image_is_readable_after_swap() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());

    let target = *renderer.scene_target();
    assert_eq!(target.written(), TextureRef::History(target.id()));
    assert_eq!(target.color(), TextureRef::Color(target.id()));
}

#[test]
fn invalid_luminance_readings_are_reported_as_none() {
    let mut gfx = HeadlessContext::new(SIZE);
    let desc = TargetDesc::color("lum", SIZE, ColorFormat::Rgba16Float).with_luminance_mips();
    let target = RenderTarget::new(&mut gfx, &desc).unwrap();

    target.generate_luminance(&mut gfx);
    for reading in [0.0, f32::NAN, f32::INFINITY, -0.5] {
        gfx.push_luminance(reading);
        assert_eq!(target.average_luminance(&mut gfx), None, "reading {reading}");
    }
    gfx.push_luminance(0.25);
    assert_eq!(target.average_luminance(&mut gfx), Some(0.25));
}
