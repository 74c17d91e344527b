//! Deferred Renderer
//!
//! [`Renderer`] owns every target, pass and filter of the pipeline and runs
//! them in a fixed order against an explicit [`GraphicsContext`]:
//!
//! ```text
//! render()
//!  ├─ pre-step      shadows ─► G-buffer fill ─► decals
//!  ├─ resolve       clear ─► depth blit ─► background ─► environment
//!  │                ─► lights ─► transparents ─► particles      (scene target)
//!  ├─ swap          scene target front/back
//!  ├─ exposure      luminance mips ─► readback ─► adapt         (optional)
//!  ├─ glow          GlowBlur × radius                           (optional)
//!  ├─ chain         HdrPrepass ─► Hdr ─► Fxaa ─► Lens ─► custom
//!  ├─ finalizer     ─► screen
//!  └─ overlay       2D entities on the screen
//! ```
//!
//! [`Renderer::render_to_cubemap`] reuses the pre-step and resolve for each
//! of the six faces of a reflection probe.

pub mod context;
pub mod cubemap;
pub mod gbuffer;
pub mod gpu;
pub mod passes;
pub mod post;
pub mod settings;
pub mod shader;
pub mod target;
pub mod window;

use glam::{Mat4, UVec2, Vec3};

use crate::errors::Result;
use crate::resources::{
    AntiAliasingSettings, GlowSettings, HdrSettings, LensSettings, LutSettings,
    MotionBlurSettings, SsaoSettings, VignetteSettings,
};
use crate::scene::{EntityLayer, RenderDimension, Scene};

use self::context::RenderingContext;
use self::cubemap::{CubeFace, CubemapRenderTarget};
use self::gbuffer::GBuffer;
use self::gpu::{
    BlendMode, ClearValue, CubemapId, DepthFormat, GraphicsContext, Rect, TargetDesc,
};
use self::passes::{DeferredEnvironmentPass, DeferredLightPass, LightPassStats};
use self::post::{
    FilterChain, FilterIo, FinalizerFilter, FrameInputs, FxaaFilter, GlowBlur, HdrFilter,
    HdrPrepassFilter, InputSource, LensFilter, OutputSink, PostFilter, StageId,
};
use self::settings::{RenderOption, RendererSettings};
use self::target::RenderTarget;
use self::window::WindowContext;

/// Counters of the last completed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Chain stages that ran. The finalizer is not counted.
    pub post_filter_invocations: u32,
    /// Horizontal/vertical glow pairs that ran.
    pub blur_iterations: u32,
    pub lights_drawn: u32,
    pub lights_culled: u32,
    /// Exposure in effect for the frame.
    pub exposure: f32,
}

/// Outcome of [`Renderer::render_to_cubemap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubemapCapture {
    /// All six faces were rendered.
    Captured,
    /// The cubemap is the scene's active environment map. Nothing was drawn.
    RefusedFeedbackLoop,
    /// The cubemap or capture target was unusable. Faces rendered before
    /// the failure, if any, are kept and the mip chain is invalidated.
    Failed,
}

/// Chain positions of the built-in stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinStages {
    pub hdr_prepass: StageId,
    pub hdr: StageId,
    pub fxaa: StageId,
    pub lens: StageId,
}

/// Window-sized buffers, reallocated together on resize.
#[derive(Debug)]
struct FrameTargets {
    gbuffer: GBuffer,
    scene: RenderTarget,
    glow: GlowBlur,
}

impl FrameTargets {
    fn allocate(
        gfx: &mut dyn GraphicsContext,
        size: UVec2,
        settings: &RendererSettings,
    ) -> Result<Self> {
        let gbuffer = GBuffer::new(gfx, "Scene", size)?;

        let desc = TargetDesc::color("Scene", size, settings.hdr_format)
            .with_depth(DepthFormat::Depth32Float)
            .double_buffered()
            .with_luminance_mips();
        let scene = match RenderTarget::new(gfx, &desc) {
            Ok(scene) => scene,
            Err(e) => {
                gbuffer.release(gfx);
                return Err(e);
            }
        };

        let glow_size = size / settings.glow_downscale.max(1);
        let glow = match GlowBlur::new(gfx, glow_size, settings.hdr_format, scene.color()) {
            Ok(glow) => glow,
            Err(e) => {
                scene.release(gfx);
                gbuffer.release(gfx);
                return Err(e);
            }
        };

        Ok(Self {
            gbuffer,
            scene,
            glow,
        })
    }

    fn release(self, gfx: &mut dyn GraphicsContext) {
        self.glow.release(gfx);
        self.scene.release(gfx);
        self.gbuffer.release(gfx);
    }
}

/// Logs a warning when dropped while still armed.
#[derive(Debug)]
struct ReleaseGuard {
    armed: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.armed {
            log::warn!(
                "Renderer dropped without release(): its targets stay allocated in the graphics context"
            );
        }
    }
}

/// The deferred frame-composition pipeline.
///
/// The renderer's targets live in the [`GraphicsContext`], which a `Drop`
/// cannot reach. Call [`release`](Self::release) before dropping it; a
/// renderer dropped without it logs a warning and leaks its targets.
///
/// # Usage
///
/// ```rust,ignore
/// let mut renderer = Renderer::new(&mut gfx, &window, RendererSettings::default())?;
///
/// loop {
///     renderer.render(&mut gfx, &mut scene, &window);
/// }
///
/// renderer.release(&mut gfx);
/// ```
pub struct Renderer {
    settings: RendererSettings,
    size: UVec2,
    targets: FrameTargets,

    environment_pass: DeferredEnvironmentPass,
    light_pass: DeferredLightPass,

    chain: FilterChain,
    stages: BuiltinStages,
    finalizer: FinalizerFilter,

    previous_view_projection: Option<Mat4>,
    stats: FrameStats,
    guard: ReleaseGuard,
}

impl Renderer {
    /// Allocates every window-sized target and wires the built-in chain
    /// `HdrPrepass → Hdr → Fxaa → Lens`.
    ///
    /// Fails when a built-in program is missing or a target is incomplete.
    pub fn new(
        gfx: &mut dyn GraphicsContext,
        window: &dyn WindowContext,
        settings: RendererSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let size = window.size().max(UVec2::ONE);

        let environment_pass = DeferredEnvironmentPass::new(gfx)?;
        let light_pass = DeferredLightPass::new(gfx)?;
        let hdr_prepass = HdrPrepassFilter::new(gfx, GlowSettings::default())?;
        let hdr = HdrFilter::new(gfx, HdrSettings::default(), MotionBlurSettings::default())?;
        let fxaa = FxaaFilter::new(gfx, AntiAliasingSettings::default())?;
        let lens = LensFilter::new(gfx, LensSettings::default())?;
        let finalizer =
            FinalizerFilter::new(gfx, VignetteSettings::default(), LutSettings::default())?;

        let targets = FrameTargets::allocate(gfx, size, &settings)?;

        let mut chain = FilterChain::new(settings.hdr_format);
        let stages = BuiltinStages {
            hdr_prepass: chain.push(
                Box::new(hdr_prepass),
                InputSource::SceneColor,
                OutputSink::FULL,
            ),
            hdr: chain.push(Box::new(hdr), InputSource::Previous, OutputSink::FULL),
            fxaa: chain.push(Box::new(fxaa), InputSource::Previous, OutputSink::FULL),
            lens: chain.push(Box::new(lens), InputSource::Previous, OutputSink::FULL),
        };
        if let Err(e) = chain.resolve(gfx, size) {
            chain.release(gfx);
            targets.release(gfx);
            return Err(e);
        }

        log::info!("Renderer created ({}x{})", size.x, size.y);
        Ok(Self {
            settings,
            size,
            targets,
            environment_pass,
            light_pass,
            chain,
            stages,
            finalizer,
            previous_view_projection: None,
            stats: FrameStats::default(),
            guard: ReleaseGuard { armed: true },
        })
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Renders one frame of `scene` to the screen.
    ///
    /// Nothing escapes this call: a frame the context cannot begin is
    /// skipped, and failed adaptive steps degrade for this frame only.
    pub fn render(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        scene: &mut dyn Scene,
        window: &dyn WindowContext,
    ) {
        let size = window.size();
        if size.x == 0 || size.y == 0 {
            log::trace!("Zero-sized window, frame skipped");
            return;
        }
        if let Err(e) = gfx.begin_frame() {
            log::warn!("Frame skipped: {e}");
            return;
        }
        if size != self.size
            && let Err(e) = self.resize(gfx, size)
        {
            log::error!("Resize to {}x{} failed: {e}", size.x, size.y);
        }

        let delta_time = window.delta_time();
        let camera_view_projection = scene.camera().view_projection();
        let ctx = RenderingContext::from_camera(scene.camera(), self.size).with_previous_view_projection(
            self.previous_view_projection.unwrap_or(camera_view_projection),
        );
        let gbuffer = self.targets.gbuffer;
        let scene_target = self.targets.scene;
        let mut stats = FrameStats::default();

        // 1. Pre-step
        scene.lights_mut().render_shadows(gfx, &ctx);
        fill_gbuffer(gfx, &*scene, &ctx, &gbuffer);

        // 2. Resolve
        let lights = self.resolve(gfx, &*scene, &ctx, &gbuffer, &scene_target);
        stats.lights_drawn = lights.drawn;
        stats.lights_culled = lights.culled;

        // 3. Swap: color() is now the image just resolved
        scene_target.swap(gfx);

        // 4. Auto-exposure
        let hdr = self
            .chain
            .filter_mut::<HdrFilter>(self.stages.hdr)
            .expect("built-in HDR stage keeps its type");
        if hdr.wants_luminance() {
            scene_target.generate_luminance(gfx);
            match scene_target.average_luminance(gfx) {
                Some(luminance) => {
                    let exposure = hdr.adapt_exposure(luminance, delta_time);
                    log::trace!("Luminance {luminance:.4}, exposure {exposure:.4}");
                }
                None => log::debug!("No valid luminance reading, exposure kept"),
            }
        }
        stats.exposure = hdr.hdr().exposure();

        let mut frame = FrameInputs {
            scene_color: scene_target.color(),
            glow: None,
            position: gbuffer.position(),
            normal_velocity: gbuffer.normal_velocity(),
            depth: gbuffer.depth(),
            previous_view_projection: ctx.previous_view_projection,
            delta_time,
        };

        // 5. Glow
        let glow = self
            .chain
            .filter::<HdrPrepassFilter>(self.stages.hdr_prepass)
            .expect("built-in HDR prepass stage keeps its type")
            .glow();
        if glow.enabled {
            stats.blur_iterations = self.targets.glow.run(gfx, glow, &frame);
            if stats.blur_iterations > 0 {
                frame.glow = Some(self.targets.glow.output());
            }
        }

        // 6. Filter chain
        let walk = self.chain.walk(gfx, &frame);
        stats.post_filter_invocations = walk.invocations;

        // 7-8. Finalizer and overlay, straight to the screen
        {
            let screen = RenderTarget::screen(gfx);
            let mut scope = screen.bind(gfx);
            scope.set_viewport(Rect::from_size(self.size));
            scope.set_scissor(None);
            scope.set_depth_test(false);
            scope.set_depth_write(false);
            scope.set_blend(BlendMode::Replace);

            let screen_ctx = RenderingContext::orthographic_2d(self.size);
            let io = FilterIo {
                input: walk.output,
                output: screen,
                frame: &frame,
            };
            self.finalizer.apply(&mut *scope, &screen_ctx, &io);

            scene.draw_entities(&mut *scope, &screen_ctx, EntityLayer::Overlay, RenderDimension::TwoD);
        }

        gfx.end_frame();
        self.previous_view_projection = Some(ctx.view_projection);
        self.stats = stats;
        log::trace!("Frame done: {stats:?}");
    }

    /// Captures the six faces of `cubemap` as seen from `position`.
    ///
    /// Refuses, with a single warning and no GPU work, to render into the
    /// scene's active environment map. Without a `target` a transient one is
    /// created and released within the call.
    pub fn render_to_cubemap(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        scene: &mut dyn Scene,
        position: Vec3,
        cubemap: CubemapId,
        target: Option<&CubemapRenderTarget>,
    ) -> CubemapCapture {
        if scene.environment().samples_cubemap(cubemap) {
            log::warn!(
                "Refusing to capture into cubemap {cubemap:?}: it is the active environment map"
            );
            return CubemapCapture::RefusedFeedbackLoop;
        }
        let (Some(size), Some(format)) = (gfx.cubemap_size(cubemap), gfx.cubemap_format(cubemap))
        else {
            log::warn!("Cubemap capture into unknown cubemap {cubemap:?}");
            return CubemapCapture::Failed;
        };

        let (capture, transient) = match target {
            Some(target) if target.fits(gfx, cubemap) => (*target, false),
            Some(target) => {
                log::warn!(
                    "Capture target ({} {:?}) cannot render into a {size} {format:?} cubemap",
                    target.size(),
                    target.format()
                );
                return CubemapCapture::Failed;
            }
            None => match CubemapRenderTarget::new(gfx, size, format) {
                Ok(target) => (target, true),
                Err(e) => {
                    log::error!("Cubemap capture target allocation failed: {e}");
                    return CubemapCapture::Failed;
                }
            },
        };

        scene.peek_simulation(self.settings.capture_step);

        let gbuffer = *capture.gbuffer();
        let resolve = *capture.resolve_target();
        let mut faces = 0;
        for face in CubeFace::ALL {
            if let Err(e) = capture.attach(gfx, cubemap, face) {
                log::error!("Cannot attach {face:?} of cubemap {cubemap:?}: {e}");
                break;
            }
            let ctx = RenderingContext::cube_face(
                position,
                face,
                size,
                self.settings.cubemap_near,
                self.settings.cubemap_far,
            );
            scene.lights_mut().update_shadows(gfx, &ctx);

            fill_gbuffer(gfx, &*scene, &ctx, &gbuffer);
            self.resolve(gfx, &*scene, &ctx, &gbuffer, &resolve);
            capture.detach(gfx);
            faces += 1;
        }

        if faces > 0 {
            gfx.invalidate_cubemap_mipmaps(cubemap);
        }
        gfx.flush();
        if transient {
            capture.release(gfx);
        }
        if faces < CubeFace::ALL.len() {
            return CubemapCapture::Failed;
        }
        log::debug!("Captured cubemap {cubemap:?} at {position}");
        CubemapCapture::Captured
    }

    /// Shades the G-buffer into `target`, then forward-renders transparents
    /// and particles over it.
    fn resolve(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        scene: &dyn Scene,
        ctx: &RenderingContext,
        gbuffer: &GBuffer,
        target: &RenderTarget,
    ) -> LightPassStats {
        let mut scope = target.bind(gfx);
        scope.set_viewport(target.viewport());
        scope.set_scissor(None);
        scope.set_depth_test(true);
        scope.set_depth_write(true);
        scope.set_blend(BlendMode::Replace);
        scope.clear(ClearValue::all(scene.environment().background_color));
        scope.blit_depth(gbuffer.target().id(), target.id());

        scene.draw_entities(&mut *scope, ctx, EntityLayer::Background, RenderDimension::ThreeD);
        self.environment_pass
            .render(&mut *scope, ctx, gbuffer, scene.environment());
        let stats = self
            .light_pass
            .render(&mut *scope, ctx, gbuffer, scene.lights().lights());

        // Transparents test against the opaque depth but do not write it.
        scope.set_depth_test(true);
        scope.set_depth_write(false);
        scope.set_blend(BlendMode::Alpha);
        scene.draw_entities(&mut *scope, ctx, EntityLayer::Transparent, RenderDimension::ThreeD);
        scene.particles().render(&mut *scope, ctx);

        scope.set_depth_write(true);
        scope.set_blend(BlendMode::Replace);
        stats
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Validates `option` and hands it to the pass or filter that owns it.
    /// Rejected values leave the previous settings in force.
    pub fn configure(&mut self, option: RenderOption) -> Result<()> {
        if let Err(e) = option.validate() {
            log::warn!("Rejected {} settings: {e}", option.group());
            return Err(e);
        }
        log::debug!("Applying {} settings", option.group());
        match option {
            RenderOption::Ssao(ssao) => self.environment_pass.set_ssao(ssao),
            RenderOption::Hdr(hdr) => self.builtin_mut::<HdrFilter>(self.stages.hdr).set_hdr(hdr),
            RenderOption::MotionBlur(motion_blur) => self
                .builtin_mut::<HdrFilter>(self.stages.hdr)
                .set_motion_blur(motion_blur),
            RenderOption::Glow(glow) => self
                .builtin_mut::<HdrPrepassFilter>(self.stages.hdr_prepass)
                .set_glow(glow),
            RenderOption::AntiAliasing(aa) => {
                self.builtin_mut::<FxaaFilter>(self.stages.fxaa).set_settings(aa);
            }
            RenderOption::Lens(lens) => {
                self.builtin_mut::<LensFilter>(self.stages.lens).set_settings(lens);
            }
            RenderOption::Lut(lut) => self.finalizer.set_lut(lut),
            RenderOption::Vignette(vignette) => self.finalizer.set_vignette(vignette),
        }
        Ok(())
    }

    #[must_use]
    pub fn ssao(&self) -> &SsaoSettings {
        self.environment_pass.ssao()
    }

    #[must_use]
    pub fn hdr(&self) -> &HdrSettings {
        self.builtin::<HdrFilter>(self.stages.hdr).hdr()
    }

    #[must_use]
    pub fn glow(&self) -> &GlowSettings {
        self.builtin::<HdrPrepassFilter>(self.stages.hdr_prepass).glow()
    }

    #[must_use]
    pub fn motion_blur(&self) -> &MotionBlurSettings {
        self.builtin::<HdrFilter>(self.stages.hdr).motion_blur()
    }

    #[must_use]
    pub fn lut(&self) -> &LutSettings {
        self.finalizer.lut()
    }

    #[must_use]
    pub fn vignette(&self) -> &VignetteSettings {
        self.finalizer.vignette()
    }

    #[must_use]
    pub fn antialiasing(&self) -> &AntiAliasingSettings {
        self.builtin::<FxaaFilter>(self.stages.fxaa).settings()
    }

    #[must_use]
    pub fn lens(&self) -> &LensSettings {
        self.builtin::<LensFilter>(self.stages.lens).settings()
    }

    fn builtin<T: PostFilter>(&self, id: StageId) -> &T {
        self.chain
            .filter::<T>(id)
            .expect("built-in post stage keeps its type")
    }

    fn builtin_mut<T: PostFilter>(&mut self, id: StageId) -> &mut T {
        self.chain
            .filter_mut::<T>(id)
            .expect("built-in post stage keeps its type")
    }

    // ========================================================================
    // Chain & Buffers
    // ========================================================================

    /// Appends a custom stage after the built-in ones and allocates its
    /// output.
    pub fn push_filter(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        filter: Box<dyn PostFilter>,
        input: InputSource,
        output: OutputSink,
    ) -> Result<StageId> {
        let id = self.chain.push(filter, input, output);
        self.chain.resolve(gfx, self.size)?;
        Ok(id)
    }

    /// Reallocates every window-sized buffer for `size`.
    ///
    /// The old buffers are kept if the new ones cannot be allocated. When
    /// only the chain outputs fail, the size stays unchanged so the next call
    /// retries. [`render`](Self::render) calls this when the window size
    /// changes.
    pub fn resize(&mut self, gfx: &mut dyn GraphicsContext, size: UVec2) -> Result<()> {
        let size = size.max(UVec2::ONE);
        if size == self.size {
            return Ok(());
        }
        if gfx.screen_size() != size {
            gfx.resize_screen(size);
        }

        let targets = FrameTargets::allocate(gfx, size, &self.settings)?;
        let old = std::mem::replace(&mut self.targets, targets);
        old.release(gfx);

        self.chain.release_auto(gfx);
        self.chain.resolve(gfx, size)?;
        self.size = size;
        log::debug!("Renderer resized to {}x{}", size.x, size.y);
        Ok(())
    }

    /// Destroys every GPU object the renderer owns.
    pub fn release(mut self, gfx: &mut dyn GraphicsContext) {
        self.guard.armed = false;
        self.chain.release(gfx);
        self.targets.release(gfx);
        log::debug!("Renderer released");
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn last_frame_stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    #[must_use]
    pub fn gbuffer(&self) -> &GBuffer {
        &self.targets.gbuffer
    }

    /// The double-buffered HDR target the scene is resolved into.
    #[inline]
    #[must_use]
    pub fn scene_target(&self) -> &RenderTarget {
        &self.targets.scene
    }

    #[inline]
    #[must_use]
    pub fn glow_blur(&self) -> &GlowBlur {
        &self.targets.glow
    }

    #[inline]
    #[must_use]
    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    #[inline]
    #[must_use]
    pub fn chain_mut(&mut self) -> &mut FilterChain {
        &mut self.chain
    }

    #[inline]
    #[must_use]
    pub fn builtin_stages(&self) -> BuiltinStages {
        self.stages
    }
}

/// Pre-step body after shadows: opaque geometry, then decals.
fn fill_gbuffer(
    gfx: &mut dyn GraphicsContext,
    scene: &dyn Scene,
    ctx: &RenderingContext,
    gbuffer: &GBuffer,
) {
    gbuffer.fill(gfx, scene, ctx);
    gbuffer.render_decals(gfx, scene, ctx);
}
