//! Shared fixtures for the pipeline tests: a warning-capturing logger, a
//! scene that records what it was asked to draw, and float helpers.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::sync::{Once, OnceLock};

use glam::{UVec2, Vec3};
use log::Log;

use gloam::renderer::context::RenderingContext;
use gloam::renderer::gpu::{GraphicsContext, TargetId};
use gloam::renderer::window::FrameWindow;
use gloam::scene::{
    Camera, EntityLayer, Environment, Light, LightManager, ParticleSystem, RenderDimension, Scene,
};
use gloam::{HeadlessContext, Renderer, RendererSettings};

pub const EPSILON: f32 = 1e-4;

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

// ============================================================================
// Capturing Logger
// ============================================================================

thread_local! {
    static WARNINGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Records warnings for assertions and forwards everything `RUST_LOG` enables
/// to `env_logger`.
struct CaptureLogger {
    inner: env_logger::Logger,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Warn || self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if record.level() <= log::Level::Warn {
            let message = record.args().to_string();
            WARNINGS.with(|w| w.borrow_mut().push(message));
        }
        if self.inner.matches(record) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static LOGGER: OnceLock<CaptureLogger> = OnceLock::new();
static INIT: Once = Once::new();

/// Installs the capturing logger (once per process) and clears the warnings
/// recorded on this thread.
pub fn capture_warnings() {
    INIT.call_once(|| {
        let logger = LOGGER.get_or_init(|| CaptureLogger {
            inner: env_logger::Builder::from_default_env().is_test(true).build(),
        });
        let level = logger.inner.filter().max(log::LevelFilter::Warn);
        log::set_logger(logger).expect("no other logger is installed in tests");
        log::set_max_level(level);
    });
    WARNINGS.with(|w| w.borrow_mut().clear());
}

/// Warnings and errors logged on this thread since [`capture_warnings`].
pub fn warnings() -> Vec<String> {
    WARNINGS.with(|w| w.borrow().clone())
}

// ============================================================================
// Recording Scene
// ============================================================================

/// One `draw_entities` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDraw {
    pub layer: EntityLayer,
    pub dimension: RenderDimension,
    pub target: Option<TargetId>,
}

#[derive(Default)]
pub struct TestLights {
    pub lights: Vec<Light>,
    pub shadow_renders: u32,
    pub shadow_updates: u32,
}

impl LightManager for TestLights {
    fn lights(&self) -> &[Light] {
        &self.lights
    }

    fn render_shadows(&mut self, gfx: &mut dyn GraphicsContext, _ctx: &RenderingContext) {
        assert!(gfx.bound_target().is_none(), "shadows rendered inside a target scope");
        self.shadow_renders += 1;
    }

    fn update_shadows(&mut self, gfx: &mut dyn GraphicsContext, _ctx: &RenderingContext) {
        assert!(gfx.bound_target().is_none(), "shadows updated inside a target scope");
        self.shadow_updates += 1;
    }
}

#[derive(Default)]
pub struct TestParticles {
    pub renders: Cell<u32>,
    pub targets: RefCell<Vec<Option<TargetId>>>,
}

impl ParticleSystem for TestParticles {
    fn render(&self, gfx: &mut dyn GraphicsContext, _ctx: &RenderingContext) {
        self.renders.set(self.renders.get() + 1);
        self.targets.borrow_mut().push(gfx.bound_target());
    }
}

/// A scene that draws nothing but remembers every request.
pub struct TestScene {
    pub camera: Camera,
    pub environment: Environment,
    pub lights: TestLights,
    pub particles: TestParticles,
    pub draws: RefCell<Vec<EntityDraw>>,
    pub peeks: Vec<f32>,
}

impl Default for TestScene {
    fn default() -> Self {
        Self {
            camera: Camera::perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 60.0, 1.0, 0.1, 100.0),
            environment: Environment::default(),
            lights: TestLights::default(),
            particles: TestParticles::default(),
            draws: RefCell::new(Vec::new()),
            peeks: Vec::new(),
        }
    }
}

impl TestScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.lights.lights.push(light);
        self
    }

    /// Draw requests for `layer`, in call order.
    pub fn draws_of(&self, layer: EntityLayer) -> Vec<EntityDraw> {
        self.draws
            .borrow()
            .iter()
            .filter(|d| d.layer == layer)
            .copied()
            .collect()
    }

    pub fn clear_draws(&self) {
        self.draws.borrow_mut().clear();
    }
}

impl Scene for TestScene {
    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn draw_entities(
        &self,
        gfx: &mut dyn GraphicsContext,
        _ctx: &RenderingContext,
        layer: EntityLayer,
        dimension: RenderDimension,
    ) {
        self.draws.borrow_mut().push(EntityDraw {
            layer,
            dimension,
            target: gfx.bound_target(),
        });
    }

    fn lights(&self) -> &dyn LightManager {
        &self.lights
    }

    fn lights_mut(&mut self) -> &mut dyn LightManager {
        &mut self.lights
    }

    fn particles(&self) -> &dyn ParticleSystem {
        &self.particles
    }

    fn peek_simulation(&mut self, step: f32) {
        self.peeks.push(step);
    }
}

// ============================================================================
// Setup
// ============================================================================

pub const SIZE: UVec2 = UVec2::new(320, 180);
pub const DT: f32 = 1.0 / 60.0;

pub fn window() -> FrameWindow {
    FrameWindow::new(SIZE, DT)
}

/// A headless context and a renderer with default settings.
pub fn setup() -> (HeadlessContext, Renderer) {
    let mut gfx = HeadlessContext::new(SIZE);
    let renderer = Renderer::new(&mut gfx, &window(), RendererSettings::default())
        .expect("renderer builds on the headless context");
    gfx.take_commands();
    (gfx, renderer)
}
