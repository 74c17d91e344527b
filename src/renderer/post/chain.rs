//! Declarative Filter Chain
//!
//! The chain is an ordered list of stages. Each stage names a filter, where
//! its input comes from and where its output goes:
//!
//! - [`InputSource::Previous`] is resolved during the walk to the output of
//!   the last *enabled* stage before it (the scene color for the first one).
//!   Disabling a stage therefore never changes the declared wiring of any
//!   other stage.
//! - [`InputSource::SceneColor`] is resolved during the walk from
//!   [`FrameInputs`], so it keeps following the renderer's scene target
//!   across resizes.
//! - [`OutputSink::Auto`] buffers are allocated by [`FilterChain::resolve`]
//!   and then left alone. Only [`FilterChain::release_auto`] (on resize) or
//!   an explicit [`FilterChain::set_output`] replaces them.

use glam::{UVec2, Vec2};

use crate::errors::Result;
use crate::renderer::gpu::{ColorFormat, GraphicsContext, TargetDesc, TextureRef};
use crate::renderer::target::RenderTarget;

use super::{FrameInputs, PostFilter, run_filter};

/// Index of a stage in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(usize);

impl StageId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSource {
    /// Output of the previous enabled stage.
    Previous,
    /// The resolved scene color of the current frame.
    SceneColor,
    /// The readable color of a caller-owned target. It must outlive the
    /// stage; renderer-owned targets are replaced on resize.
    Target(RenderTarget),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputSink {
    /// A buffer owned by the chain, `scale` times the chain size.
    Auto { scale: f32 },
    /// A caller-owned target.
    Target(RenderTarget),
}

impl OutputSink {
    /// Full-size owned buffer.
    pub const FULL: Self = Self::Auto { scale: 1.0 };
}

struct FilterStage {
    filter: Box<dyn PostFilter>,
    input: InputSource,
    output: OutputSink,
    target: Option<RenderTarget>,
}

/// Result of [`FilterChain::walk`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainWalk {
    /// The last produced image (the scene color when nothing ran).
    pub output: TextureRef,
    pub invocations: u32,
}

pub struct FilterChain {
    stages: Vec<FilterStage>,
    format: ColorFormat,
    size: UVec2,
}

impl FilterChain {
    /// An empty chain whose owned buffers use `format`.
    #[must_use]
    pub fn new(format: ColorFormat) -> Self {
        Self {
            stages: Vec::new(),
            format,
            size: UVec2::ZERO,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Appends a stage. Its output is allocated by the next
    /// [`resolve`](Self::resolve).
    pub fn push(
        &mut self,
        filter: Box<dyn PostFilter>,
        input: InputSource,
        output: OutputSink,
    ) -> StageId {
        let id = StageId(self.stages.len());
        log::debug!("Post stage {} '{}' added", id.0, filter.name());
        self.stages.push(FilterStage {
            filter,
            input,
            output,
            target: None,
        });
        id
    }

    /// Assigns an output target to every stage that has none. Stages that
    /// already have one are untouched.
    pub fn resolve(&mut self, gfx: &mut dyn GraphicsContext, size: UVec2) -> Result<()> {
        self.size = size;
        for stage in &mut self.stages {
            if stage.target.is_some() {
                continue;
            }
            stage.target = Some(match stage.output {
                OutputSink::Target(target) => target,
                OutputSink::Auto { scale } => {
                    let scale = if scale.is_finite() && scale > 0.0 {
                        scale
                    } else {
                        log::warn!(
                            "Stage '{}' has invalid output scale {scale}, using 1",
                            stage.filter.name()
                        );
                        1.0
                    };
                    let extent = (size.as_vec2() * scale).round().max(Vec2::ONE).as_uvec2();
                    let desc = TargetDesc::color(
                        format!("{} Output", stage.filter.name()),
                        extent,
                        self.format,
                    );
                    RenderTarget::new(gfx, &desc)?
                }
            });
        }
        Ok(())
    }

    /// Destroys every chain-owned buffer. The next
    /// [`resolve`](Self::resolve) allocates fresh ones.
    pub fn release_auto(&mut self, gfx: &mut dyn GraphicsContext) {
        for stage in &mut self.stages {
            if matches!(stage.output, OutputSink::Auto { .. })
                && let Some(target) = stage.target.take()
            {
                target.release(gfx);
            }
        }
    }

    /// Releases chain-owned buffers and drops every stage.
    pub fn release(mut self, gfx: &mut dyn GraphicsContext) {
        self.release_auto(gfx);
        self.stages.clear();
    }

    #[must_use]
    pub fn input(&self, id: StageId) -> Option<InputSource> {
        self.stages.get(id.0).map(|s| s.input)
    }

    pub fn set_input(&mut self, id: StageId, input: InputSource) {
        if let Some(stage) = self.stages.get_mut(id.0) {
            stage.input = input;
        }
    }

    /// The target stage `id` writes into, once resolved.
    #[must_use]
    pub fn output_target(&self, id: StageId) -> Option<RenderTarget> {
        self.stages.get(id.0).and_then(|s| s.target)
    }

    /// Replaces the output of stage `id`, releasing a chain-owned buffer it
    /// had. Explicit targets take effect immediately; auto buffers on the
    /// next [`resolve`](Self::resolve).
    pub fn set_output(&mut self, gfx: &mut dyn GraphicsContext, id: StageId, output: OutputSink) {
        let Some(stage) = self.stages.get_mut(id.0) else {
            return;
        };
        if matches!(stage.output, OutputSink::Auto { .. })
            && let Some(target) = stage.target.take()
        {
            target.release(gfx);
        }
        stage.output = output;
        stage.target = match output {
            OutputSink::Target(target) => Some(target),
            OutputSink::Auto { .. } => None,
        };
    }

    #[must_use]
    pub fn name(&self, id: StageId) -> Option<&str> {
        self.stages.get(id.0).map(|s| s.filter.name())
    }

    #[must_use]
    pub fn is_enabled(&self, id: StageId) -> bool {
        self.stages.get(id.0).is_some_and(|s| s.filter.is_enabled())
    }

    /// Typed access to the filter of stage `id`.
    #[must_use]
    pub fn filter<T: PostFilter>(&self, id: StageId) -> Option<&T> {
        self.stages.get(id.0)?.filter.as_any().downcast_ref()
    }

    pub fn filter_mut<T: PostFilter>(&mut self, id: StageId) -> Option<&mut T> {
        self.stages.get_mut(id.0)?.filter.as_any_mut().downcast_mut()
    }

    /// Runs every enabled stage in insertion order.
    pub fn walk(&mut self, gfx: &mut dyn GraphicsContext, frame: &FrameInputs) -> ChainWalk {
        let mut previous = frame.scene_color;
        let mut invocations = 0;

        for (index, stage) in self.stages.iter_mut().enumerate() {
            if !stage.filter.is_enabled() {
                log::trace!("Stage {index} '{}' disabled, skipped", stage.filter.name());
                continue;
            }
            let Some(output) = stage.target else {
                log::warn!("Stage {index} '{}' has no output buffer", stage.filter.name());
                continue;
            };
            let input = match stage.input {
                InputSource::Previous => previous,
                InputSource::SceneColor => frame.scene_color,
                InputSource::Target(target) => target.color(),
            };
            run_filter(gfx, stage.filter.as_mut(), input, &output, frame);
            previous = output.written();
            invocations += 1;
        }

        ChainWalk {
            output: previous,
            invocations,
        }
    }
}
