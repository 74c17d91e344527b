//! Shaders
//!
//! The pipeline treats a shader as a black box that can be bound with a
//! [`RenderingContext`]. Binding makes the program current, uploads the
//! context matrices and then the shader's own named parameters. The returned
//! [`ProgramScope`] releases the program when dropped.
//!
//! # Context Uniforms
//!
//! | Name | Type |
//! |------|------|
//! | `view_projection` | `Mat4` |
//! | `inverse_view_projection` | `Mat4` |
//! | `model` | `Mat4` |
//! | `camera_position` | `Vec3` |
//! | `viewport` | `Vec2` |
//!
//! Programs that do not declare one of these simply ignore it.

mod parameters;

pub use parameters::{ParameterHandle, ParameterSource, ShaderParameters};

use crate::errors::{Result, validation_failure};
use crate::renderer::context::RenderingContext;
use crate::renderer::gpu::{GraphicsContext, ProgramId, ProgramScope, UniformValue};

/// Something that can be bound for drawing.
pub trait Shader {
    /// Makes the shader current and uploads its uniforms. Dropping the scope
    /// unbinds it.
    fn bind<'a>(
        &self,
        gfx: &'a mut dyn GraphicsContext,
        ctx: &RenderingContext,
    ) -> ProgramScope<'a>;
}

/// A registered program plus its named parameters.
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    program: ProgramId,
    parameters: ShaderParameters,
}

impl ShaderProgram {
    /// Looks up the program `name` in the context.
    ///
    /// A missing or unlinkable program is a GPU validation failure: it is
    /// logged and asserts in debug builds.
    pub fn load(gfx: &mut dyn GraphicsContext, name: &str) -> Result<Self> {
        let program = gfx.find_program(name).map_err(validation_failure)?;
        Ok(Self {
            name: name.to_string(),
            program,
            parameters: ShaderParameters::new(),
        })
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: ShaderParameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ProgramId {
        self.program
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &ShaderParameters {
        &self.parameters
    }

    #[inline]
    pub fn parameters_mut(&mut self) -> &mut ShaderParameters {
        &mut self.parameters
    }

    /// Shorthand for `parameters_mut().set(name, value)`.
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        self.parameters.set(name, value)
    }
}

impl Shader for ShaderProgram {
    fn bind<'a>(
        &self,
        gfx: &'a mut dyn GraphicsContext,
        ctx: &RenderingContext,
    ) -> ProgramScope<'a> {
        let mut scope = ProgramScope::new(gfx, self.program);
        scope.set_uniform("view_projection", ctx.view_projection.into());
        scope.set_uniform("inverse_view_projection", ctx.inverse_view_projection.into());
        scope.set_uniform("model", ctx.model.into());
        scope.set_uniform("camera_position", ctx.camera_position.into());
        scope.set_uniform("viewport", ctx.viewport_size().into());
        self.parameters.upload(&mut *scope);
        scope
    }
}
