//! Scene interface.
//!
//! The pipeline does not own a scene graph. It talks to the host's scene
//! through the [`Scene`] trait: the scene knows how to draw its entities by
//! layer, owns its lights (and their shadow maps) and its particle systems.
//! The renderer borrows the scene for the duration of one call.

pub mod camera;
pub mod environment;
pub mod light;

pub use camera::Camera;
pub use environment::Environment;
pub use light::{Light, LightKind, ShadowConfig};

use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::GraphicsContext;

/// Which group of entities a draw call should submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityLayer {
    /// Sky and far scenery, drawn into the resolve target before lighting.
    Background,
    /// Opaque geometry, written into the G-buffer.
    Opaque,
    /// Decals, blended over the G-buffer albedo.
    Decal,
    /// Forward-shaded, alpha-blended geometry.
    Transparent,
    /// Screen-space UI drawn after the finalizer.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderDimension {
    TwoD,
    ThreeD,
}

/// Owns the scene's lights and renders their shadow maps.
pub trait LightManager {
    fn lights(&self) -> &[Light];

    /// Renders shadow maps for the main view.
    fn render_shadows(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext);

    /// Refits shadow maps to a new viewpoint. Called per cubemap face.
    fn update_shadows(&mut self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext);
}

pub trait ParticleSystem {
    fn render(&self, gfx: &mut dyn GraphicsContext, ctx: &RenderingContext);
}

/// What the renderer needs from a scene.
pub trait Scene {
    fn camera(&self) -> &Camera;

    fn environment(&self) -> &Environment;

    /// Issues draw calls for every entity in `layer` with the given
    /// dimensionality. The target and fixed-function state are already set.
    fn draw_entities(
        &self,
        gfx: &mut dyn GraphicsContext,
        ctx: &RenderingContext,
        layer: EntityLayer,
        dimension: RenderDimension,
    );

    fn lights(&self) -> &dyn LightManager;

    fn lights_mut(&mut self) -> &mut dyn LightManager;

    fn particles(&self) -> &dyn ParticleSystem;

    /// Advances transient simulation (particles, animated probes) by `step`
    /// seconds without committing it as a frame. Used before cubemap capture
    /// so reflections are not one step behind.
    fn peek_simulation(&mut self, step: f32);
}
