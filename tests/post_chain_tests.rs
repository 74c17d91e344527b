//! Post-Filter Chain Tests
//!
//! Tests for:
//! - Disabled stages are skipped without touching anyone's wiring
//! - Idempotent output allocation
//! - Custom stages (auto and explicit outputs, scene color across resizes)
//! - Iterative glow blur: pair count, radius growth, buffer rewiring and reset

mod common;

use std::any::Any;

use glam::UVec2;

use common::*;
use gloam::renderer::context::RenderingContext;
use gloam::renderer::gpu::headless::GpuCommand;
use gloam::renderer::gpu::{
    ColorFormat, GraphicsContext, TargetDesc, TextureRef, UniformValue,
};
use gloam::renderer::post::{FilterIo, InputSource, OutputSink, PostFilter};
use gloam::renderer::shader::{Shader, ShaderProgram};
use gloam::renderer::target::RenderTarget;
use gloam::renderer::window::FrameWindow;
use gloam::{HeadlessContext, RenderOption, Renderer};

/// A pass-through filter that counts its invocations.
struct Tint {
    shader: ShaderProgram,
    enabled: bool,
    applied: u32,
}

impl Tint {
    fn new(gfx: &mut dyn GraphicsContext) -> Self {
        Self {
            shader: ShaderProgram::load(gfx, "tint").unwrap(),
            enabled: true,
            applied: 0,
        }
    }
}

impl PostFilter for Tint {
    fn name(&self) -> &str {
        "Tint"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        self.applied += 1;
        let mut program = self.shader.bind(gfx, ctx);
        program.bind_texture(0, io.input);
        program.draw_fullscreen();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// `(target, unit 0 texture)` of every draw with `program`.
fn draws_of(gfx: &HeadlessContext, program: &str) -> Vec<(gloam::renderer::gpu::TargetId, TextureRef)> {
    let Some(id) = gfx.program_id(program) else {
        return Vec::new();
    };
    gfx.commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::Draw {
                target,
                program,
                textures,
                ..
            } if *program == id => {
                let input = textures
                    .iter()
                    .find(|(unit, _)| *unit == 0)
                    .map(|(_, t)| *t)
                    .expect("post draws sample unit 0");
                Some((*target, input))
            }
            _ => None,
        })
        .collect()
}

/// Values uploaded to `uniform` while `program` was current, in order.
fn uploads(gfx: &HeadlessContext, program: &str, uniform: &str) -> Vec<f32> {
    let id = gfx.program_id(program).unwrap();
    gfx.commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetUniform {
                program,
                name,
                value: UniformValue::Float(v),
            } if *program == id && name == uniform => Some(*v),
            _ => None,
        })
        .collect()
}

fn enable_lens(renderer: &mut Renderer) {
    let mut lens = renderer.lens().clone();
    lens.enabled = true;
    renderer.configure(RenderOption::Lens(lens)).unwrap();
}

fn set_fxaa(renderer: &mut Renderer, enabled: bool) {
    let mut aa = renderer.antialiasing().clone();
    aa.set_enabled(enabled);
    renderer.configure(RenderOption::AntiAliasing(aa)).unwrap();
}

// ============================================================================
// Skipping
// ============================================================================

#[test]
fn disabling_a_stage_skips_it_and_keeps_wiring() {
    let (mut gfx, mut renderer) = setup();
    enable_lens(&mut renderer);
    let stages = renderer.builtin_stages();
    let outputs: Vec<_> = [stages.hdr_prepass, stages.hdr, stages.fxaa, stages.lens]
        .map(|id| renderer.chain().output_target(id).unwrap())
        .to_vec();
    let fxaa_output = outputs[2];
    let hdr_output = outputs[1];
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(draws_of(&gfx, "lens")[0].1, fxaa_output.color());

    set_fxaa(&mut renderer, false);
    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(gfx.draws_with_program("fxaa"), 0);
    assert_eq!(draws_of(&gfx, "lens")[0].1, hdr_output.color());
    assert_eq!(renderer.last_frame_stats().post_filter_invocations, 3);

    // Nothing about the declared chain changed.
    assert_eq!(renderer.chain().input(stages.lens), Some(InputSource::Previous));
    assert_eq!(renderer.chain().input(stages.fxaa), Some(InputSource::Previous));
    let after: Vec<_> = [stages.hdr_prepass, stages.hdr, stages.fxaa, stages.lens]
        .map(|id| renderer.chain().output_target(id).unwrap())
        .to_vec();
    assert_eq!(after, outputs);

    set_fxaa(&mut renderer, true);
    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(draws_of(&gfx, "lens")[0].1, fxaa_output.color());
}

#[test]
fn finalizer_reads_the_last_enabled_stage() {
    let (mut gfx, mut renderer) = setup();
    let stages = renderer.builtin_stages();
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());
    let fxaa_output = renderer.chain().output_target(stages.fxaa).unwrap();
    assert_eq!(draws_of(&gfx, "finalizer"), vec![(gfx.screen(), fxaa_output.color())]);
}

#[test]
fn prepass_reads_the_scene_and_the_glow() {
    let (mut gfx, mut renderer) = setup();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());

    let GpuCommand::Draw { textures, .. } = gfx
        .commands()
        .iter()
        .find(|c| matches!(c, GpuCommand::Draw { program, .. } if Some(*program) == gfx.program_id("hdr_prepass")))
        .cloned()
        .unwrap()
    else {
        unreachable!()
    };
    assert!(textures.contains(&(0, renderer.scene_target().color())));
    assert!(textures.contains(&(1, renderer.glow_blur().output())));
    assert_eq!(gfx.uniform("hdr_prepass", "has_glow"), Some(UniformValue::Float(1.0)));
}

// ============================================================================
// Custom Stages
// ============================================================================

#[test]
fn custom_stage_runs_after_the_built_ins() {
    let (mut gfx, mut renderer) = setup();
    let tint = Box::new(Tint::new(&mut gfx));
    let id = renderer
        .push_filter(&mut gfx, tint, InputSource::Previous, OutputSink::FULL)
        .unwrap();
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let stages = renderer.builtin_stages();
    let fxaa_output = renderer.chain().output_target(stages.fxaa).unwrap();
    let tint_output = renderer.chain().output_target(id).unwrap();
    assert_eq!(draws_of(&gfx, "tint"), vec![(tint_output.id(), fxaa_output.color())]);
    assert_eq!(draws_of(&gfx, "finalizer")[0].1, tint_output.color());
    assert_eq!(renderer.chain().filter::<Tint>(id).unwrap().applied, 1);
    assert_eq!(renderer.last_frame_stats().post_filter_invocations, 4);
}

#[test]
fn pushing_a_stage_keeps_existing_outputs() {
    let (mut gfx, mut renderer) = setup();
    let stages = renderer.builtin_stages();
    let before = renderer.chain().output_target(stages.hdr).unwrap();
    let live = gfx.live_targets();

    let tint = Box::new(Tint::new(&mut gfx));
    renderer
        .push_filter(&mut gfx, tint, InputSource::Previous, OutputSink::Auto { scale: 0.5 })
        .unwrap();

    assert_eq!(renderer.chain().output_target(stages.hdr).unwrap(), before);
    assert_eq!(gfx.live_targets(), live + 1);
}

#[test]
fn scaled_auto_output_follows_the_window() {
    let (mut gfx, mut renderer) = setup();
    let tint = Box::new(Tint::new(&mut gfx));
    let id = renderer
        .push_filter(&mut gfx, tint, InputSource::Previous, OutputSink::Auto { scale: 0.5 })
        .unwrap();
    assert_eq!(renderer.chain().output_target(id).unwrap().size(), SIZE / 2);

    renderer.resize(&mut gfx, SIZE * 2).unwrap();
    assert_eq!(renderer.chain().output_target(id).unwrap().size(), SIZE);
}

#[test]
fn disabled_custom_stage_is_skipped() {
    let (mut gfx, mut renderer) = setup();
    let mut tint = Tint::new(&mut gfx);
    tint.enabled = false;
    let id = renderer
        .push_filter(&mut gfx, Box::new(tint), InputSource::Previous, OutputSink::FULL)
        .unwrap();
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    assert_eq!(gfx.draws_with_program("tint"), 0);
    let fxaa_output = renderer
        .chain()
        .output_target(renderer.builtin_stages().fxaa)
        .unwrap();
    assert_eq!(draws_of(&gfx, "finalizer")[0].1, fxaa_output.color());

    renderer.chain_mut().filter_mut::<Tint>(id).unwrap().enabled = true;
    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(gfx.draws_with_program("tint"), 1);
}

#[test]
fn scene_color_input_follows_a_resize() {
    let (mut gfx, mut renderer) = setup();
    let tint = Box::new(Tint::new(&mut gfx));
    let id = renderer
        .push_filter(&mut gfx, tint, InputSource::SceneColor, OutputSink::FULL)
        .unwrap();
    let mut scene = TestScene::new();
    renderer.render(&mut gfx, &mut scene, &window());
    let old_scene = *renderer.scene_target();

    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &FrameWindow::new(SIZE * 2, DT));

    assert!(gfx.target_size(old_scene.id()).is_none());
    let tint_output = renderer.chain().output_target(id).unwrap();
    assert_eq!(
        draws_of(&gfx, "tint"),
        vec![(tint_output.id(), renderer.scene_target().color())]
    );
    assert_eq!(renderer.chain().input(id), Some(InputSource::SceneColor));
}

#[test]
fn explicit_output_survives_resize_and_release() {
    let (mut gfx, mut renderer) = setup();
    let mine = RenderTarget::new(
        &mut gfx,
        &TargetDesc::color("Mine", UVec2::new(64, 64), ColorFormat::Rgba16Float),
    )
    .unwrap();
    let tint = Box::new(Tint::new(&mut gfx));
    let id = renderer
        .push_filter(&mut gfx, tint, InputSource::Previous, OutputSink::Target(mine))
        .unwrap();
    assert_eq!(renderer.chain().output_target(id), Some(mine));

    renderer.resize(&mut gfx, SIZE * 2).unwrap();
    assert_eq!(renderer.chain().output_target(id), Some(mine));
    assert!(gfx.target_size(mine.id()).is_some());

    renderer.release(&mut gfx);
    assert!(gfx.target_size(mine.id()).is_some());
}

// ============================================================================
// Glow Blur
// ============================================================================

fn set_glow_radius(renderer: &mut Renderer, radius: u32, spread: f32) {
    let mut glow = renderer.glow().clone();
    glow.set_radius(radius);
    glow.set_spread(spread);
    glow.set_threshold(0.8);
    renderer.configure(RenderOption::Glow(glow)).unwrap();
}

#[test]
fn glow_runs_one_pair_per_iteration() {
    let (mut gfx, mut renderer) = setup();
    set_glow_radius(&mut renderer, 3, 1.0);
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let glow = renderer.glow_blur();
    let h = glow.horizontal().output;
    let v = glow.vertical().output;
    let scene_color = renderer.scene_target().color();

    assert_eq!(renderer.last_frame_stats().blur_iterations, 3);
    assert_eq!(
        draws_of(&gfx, "blur"),
        vec![
            (h.id(), scene_color),
            (v.id(), h.color()),
            (h.id(), v.color()),
            (v.id(), h.color()),
            (h.id(), v.color()),
            (v.id(), h.color()),
        ]
    );
}

#[test]
fn glow_radius_grows_with_each_iteration() {
    let (mut gfx, mut renderer) = setup();
    set_glow_radius(&mut renderer, 3, 1.5);
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    let radii = uploads(&gfx, "blur", "radius");
    assert_eq!(radii.len(), 6);
    for (pass, radius) in radii.iter().enumerate() {
        let iteration = (pass / 2 + 1) as f32;
        assert!(approx(*radius, iteration * 1.5), "pass {pass}: radius {radius}");
    }

    // Only the first horizontal pass applies the bright-pass threshold.
    let thresholds = uploads(&gfx, "blur", "threshold");
    assert!(approx(thresholds[0], 0.8));
    assert!(thresholds[1..].iter().all(|t| *t == 0.0));
}

#[test]
fn glow_input_is_restored_after_the_blur() {
    let (mut gfx, mut renderer) = setup();
    set_glow_radius(&mut renderer, 5, 1.0);
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());
    let glow = renderer.glow_blur();
    assert_eq!(glow.horizontal().input, glow.primary());
    assert_eq!(glow.primary(), renderer.scene_target().color());

    // The second frame starts from the scene again.
    gfx.take_commands();
    renderer.render(&mut gfx, &mut scene, &window());
    assert_eq!(draws_of(&gfx, "blur")[0].1, renderer.scene_target().color());
}

#[test]
fn zero_radius_glow_composites_nothing() {
    let (mut gfx, mut renderer) = setup();
    set_glow_radius(&mut renderer, 0, 1.0);
    let mut scene = TestScene::new();

    renderer.render(&mut gfx, &mut scene, &window());

    assert_eq!(gfx.draws_with_program("blur"), 0);
    assert_eq!(renderer.last_frame_stats().blur_iterations, 0);
    assert_eq!(gfx.draws_with_program("hdr_prepass"), 1);
    assert_eq!(gfx.uniform("hdr_prepass", "has_glow"), Some(UniformValue::Float(0.0)));
}

#[test]
fn glow_buffers_are_downscaled() {
    let (_gfx, renderer) = setup();
    let expected = SIZE / renderer.settings().glow_downscale;
    assert_eq!(renderer.glow_blur().horizontal().output.size(), expected);
    assert_eq!(renderer.glow_blur().vertical().output.size(), expected);
}
