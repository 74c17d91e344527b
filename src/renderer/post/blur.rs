//! Separable Blur & Iterative Glow
//!
//! [`BlurFilter`] is one direction of a separable Gaussian. [`GlowBlur`]
//! chains a horizontal and a vertical stage over two half-resolution
//! ping-pong buffers and runs the pair once per glow iteration:
//!
//! ```text
//! iteration 1:  scene ─H─► h ─V─► v      (H also applies the bright pass)
//! iteration 2:      v ─H─► h ─V─► v
//! ...
//! after:        H input = scene
//! ```
//!
//! Iteration `i` uses radius `i * spread`, so the kernel widens as the image
//! gets blurred again and again. The horizontal input is put back to the
//! scene color after the last iteration so the next frame starts clean.

use std::any::Any;

use glam::{UVec2, Vec2};

use crate::errors::Result;
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::{ColorFormat, GraphicsContext, TargetDesc, TextureRef};
use crate::renderer::shader::{Shader, ShaderParameters, ShaderProgram};
use crate::renderer::target::RenderTarget;
use crate::resources::GlowSettings;

use super::{FilterIo, FrameInputs, PostFilter, run_filter};

pub const PROGRAM: &str = "blur";

/// One direction of a separable blur.
#[derive(Debug)]
pub struct BlurFilter {
    name: &'static str,
    shader: ShaderProgram,
    direction: Vec2,
    radius: f32,
    threshold: f32,
}

impl BlurFilter {
    pub fn horizontal(gfx: &mut dyn GraphicsContext) -> Result<Self> {
        Self::new(gfx, "Blur H", Vec2::X)
    }

    pub fn vertical(gfx: &mut dyn GraphicsContext) -> Result<Self> {
        Self::new(gfx, "Blur V", Vec2::Y)
    }

    fn new(gfx: &mut dyn GraphicsContext, name: &'static str, direction: Vec2) -> Result<Self> {
        let parameters = ShaderParameters::new()
            .with("direction", direction)
            .with("radius", 1.0)
            .with("threshold", 0.0);
        Ok(Self {
            name,
            shader: ShaderProgram::load(gfx, PROGRAM)?.with_parameters(parameters),
            direction,
            radius: 1.0,
            threshold: 0.0,
        })
    }

    #[inline]
    #[must_use]
    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    /// Bright-pass luminance threshold; `0` disables it.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }
}

impl PostFilter for BlurFilter {
    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn apply(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext, io: &FilterIo<'_>) {
        let params = self.shader.parameters_mut();
        params.set("direction", self.direction);
        params.set("radius", self.radius);
        params.set("threshold", self.threshold);

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

/// A blur filter wired to an input image and an output buffer.
#[derive(Debug)]
pub struct BlurStage {
    pub filter: BlurFilter,
    pub input: TextureRef,
    pub output: RenderTarget,
}

impl BlurStage {
    fn run(&mut self, gfx: &mut dyn GraphicsContext, frame: &FrameInputs) {
        run_filter(gfx, &mut self.filter, self.input, &self.output, frame);
    }
}

/// The iterative glow path.
#[derive(Debug)]
pub struct GlowBlur {
    horizontal: BlurStage,
    vertical: BlurStage,
    primary: TextureRef,
}

impl GlowBlur {
    /// Creates the ping-pong buffers at `size`. `primary` is the image the
    /// first horizontal pass of every frame reads.
    pub fn new(
        gfx: &mut dyn GraphicsContext,
        size: UVec2,
        format: ColorFormat,
        primary: TextureRef,
    ) -> Result<Self> {
        let size = size.max(UVec2::ONE);
        let h_filter = BlurFilter::horizontal(gfx)?;
        let v_filter = BlurFilter::vertical(gfx)?;
        let h_target = RenderTarget::new(gfx, &TargetDesc::color("Glow H", size, format))?;
        let v_target = match RenderTarget::new(gfx, &TargetDesc::color("Glow V", size, format)) {
            Ok(target) => target,
            Err(e) => {
                h_target.release(gfx);
                return Err(e);
            }
        };
        Ok(Self {
            horizontal: BlurStage {
                filter: h_filter,
                input: primary,
                output: h_target,
            },
            vertical: BlurStage {
                filter: v_filter,
                input: h_target.color(),
                output: v_target,
            },
            primary,
        })
    }

    #[inline]
    #[must_use]
    pub fn horizontal(&self) -> &BlurStage {
        &self.horizontal
    }

    #[inline]
    #[must_use]
    pub fn vertical(&self) -> &BlurStage {
        &self.vertical
    }

    #[inline]
    #[must_use]
    pub fn primary(&self) -> TextureRef {
        self.primary
    }

    /// The blurred result (the vertical buffer).
    #[inline]
    #[must_use]
    pub fn output(&self) -> TextureRef {
        self.vertical.output.color()
    }

    /// Runs `settings.radius()` horizontal/vertical pairs. Returns the
    /// number of pairs run.
    pub fn run(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        settings: &GlowSettings,
        frame: &FrameInputs,
    ) -> u32 {
        let iterations = settings.radius();
        for i in 1..=iterations {
            let radius = settings.iteration_radius(i);

            self.horizontal.filter.set_radius(radius);
            self.horizontal
                .filter
                .set_threshold(if i == 1 { settings.threshold() } else { 0.0 });
            self.horizontal.run(gfx, frame);

            self.vertical.filter.set_radius(radius);
            self.vertical.run(gfx, frame);

            self.horizontal.input = self.vertical.output.color();
        }
        self.horizontal.input = self.primary;
        log::trace!("Glow blur: {iterations} iteration(s)");
        iterations
    }

    pub fn release(self, gfx: &mut dyn GraphicsContext) {
        self.horizontal.output.release(gfx);
        self.vertical.output.release(gfx);
    }
}
