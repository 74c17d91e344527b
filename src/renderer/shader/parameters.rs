//! Named Shader Parameters
//!
//! A [`ShaderParameters`] table maps uniform names to typed value sources. A
//! source is evaluated each time the owning shader is bound:
//!
//! | Source | Evaluated as |
//! |--------|--------------|
//! | Value | The stored value |
//! | Shared | The current content of an `Rc<Cell<UniformValue>>` owned elsewhere |
//! | Callback | The result of a zero-argument closure |
//!
//! The type of a parameter is fixed by its first definition. Lookups of
//! unknown names and writes of the wrong type are logged and ignored; they
//! never abort a frame.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::renderer::gpu::{GraphicsContext, UniformKind, UniformValue};

/// Where a parameter's value comes from at bind time.
pub enum ParameterSource {
    Value(UniformValue),
    Shared(Rc<Cell<UniformValue>>),
    Callback(Box<dyn Fn() -> UniformValue>),
}

impl ParameterSource {
    fn evaluate(&self) -> UniformValue {
        match self {
            Self::Value(v) => *v,
            Self::Shared(cell) => cell.get(),
            Self::Callback(f) => f(),
        }
    }
}

impl fmt::Debug for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Shared(cell) => f.debug_tuple("Shared").field(&cell.get()).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
struct Parameter {
    name: String,
    kind: UniformKind,
    source: ParameterSource,
}

/// Handle to one parameter of a [`ShaderParameters`] table.
///
/// A handle for an unknown name is *null*: every operation on it is a no-op.
pub struct ParameterHandle<'a> {
    slot: Option<&'a mut Parameter>,
}

impl ParameterHandle<'_> {
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.slot.is_none()
    }

    /// Current value, evaluating shared and callback sources.
    #[must_use]
    pub fn value(&self) -> Option<UniformValue> {
        self.slot.as_ref().map(|p| p.source.evaluate())
    }

    /// Binds a fixed value. Returns `false` on a null handle or type mismatch.
    pub fn set(&mut self, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        let Some(param) = self.slot.as_deref_mut() else {
            return false;
        };
        if !check_kind(param, value.kind()) {
            return false;
        }
        param.source = ParameterSource::Value(value);
        true
    }

    /// Binds a live reference. The cell is read on every bind.
    pub fn bind_shared(&mut self, cell: Rc<Cell<UniformValue>>) -> bool {
        let Some(param) = self.slot.as_deref_mut() else {
            return false;
        };
        if !check_kind(param, cell.get().kind()) {
            return false;
        }
        param.source = ParameterSource::Shared(cell);
        true
    }

    /// Binds a callback evaluated on every bind. Its result type is checked
    /// at upload time.
    pub fn bind_callback(&mut self, callback: impl Fn() -> UniformValue + 'static) -> bool {
        let Some(param) = self.slot.as_deref_mut() else {
            return false;
        };
        param.source = ParameterSource::Callback(Box::new(callback));
        true
    }
}

fn check_kind(param: &Parameter, kind: UniformKind) -> bool {
    if param.kind == kind {
        return true;
    }
    log::warn!(
        "Shader parameter '{}' is {:?}, ignoring {:?} value",
        param.name,
        param.kind,
        kind
    );
    false
}

/// Named uniform values of one shader program.
#[derive(Debug, Default)]
pub struct ShaderParameters {
    params: Vec<Parameter>,
    index: FxHashMap<String, usize>,
}

impl ShaderParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` with an initial value. The value's type becomes the
    /// parameter's type. Redefining a name replaces type and value.
    pub fn define(&mut self, name: &str, value: impl Into<UniformValue>) {
        let value = value.into();
        let param = Parameter {
            name: name.to_string(),
            kind: value.kind(),
            source: ParameterSource::Value(value),
        };
        match self.index.get(name) {
            Some(&i) => self.params[i] = param,
            None => {
                self.index.insert(name.to_string(), self.params.len());
                self.params.push(param);
            }
        }
    }

    /// Builder form of [`define`](Self::define).
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.define(name, value);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<UniformKind> {
        self.index.get(name).map(|&i| self.params[i].kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Looks up a parameter. Unknown names log a warning and yield a null
    /// handle.
    pub fn param(&mut self, name: &str) -> ParameterHandle<'_> {
        let slot = match self.index.get(name) {
            Some(&i) => Some(&mut self.params[i]),
            None => {
                log::warn!("Unknown shader parameter '{name}'");
                None
            }
        };
        ParameterHandle { slot }
    }

    /// Shorthand for `param(name).set(value)`.
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        self.param(name).set(value)
    }

    /// Current value of `name`, if defined.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.index.get(name).map(|&i| self.params[i].source.evaluate())
    }

    /// Evaluates every source and uploads it to the current program.
    ///
    /// Returns the number of values the program accepted.
    pub fn upload(&self, gfx: &mut dyn GraphicsContext) -> usize {
        let mut accepted = 0;
        for param in &self.params {
            let value = param.source.evaluate();
            if value.kind() != param.kind {
                log::warn!(
                    "Shader parameter '{}' callback returned {:?}, expected {:?}",
                    param.name,
                    value.kind(),
                    param.kind
                );
                continue;
            }
            if gfx.set_uniform(&param.name, value) {
                accepted += 1;
            } else {
                log::trace!("Program has no uniform '{}'", param.name);
            }
        }
        accepted
    }
}
