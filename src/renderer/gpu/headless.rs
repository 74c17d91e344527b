//! Headless Graphics Context
//!
//! A [`GraphicsContext`] that validates every call against the binding rules
//! and records it as a [`GpuCommand`], without touching a GPU. The pipeline's
//! ordering guarantees (pre-step before resolve, swap before luminance, glow
//! before the chain, finalizer into the screen) become plain assertions over
//! the command log.
//!
//! Validation is strict. Misuse that a real driver would silently accept or
//! report asynchronously panics here with a description of the problem:
//!
//! - unbinding a target that is not the innermost bound one
//! - drawing with no target or no program bound
//! - sampling an image that the current draw writes to (feedback loop)
//! - swapping the attachments of a bound or single-buffered target
//! - reading luminance from a stale mip chain
//! - using a destroyed handle
//!
//! Texture units are scoped to the current program: switching programs clears
//! them.

use std::collections::VecDeque;

use glam::UVec2;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{
    BlendMode, ClearValue, ColorFormat, CubeFace, CubemapId, GraphicsContext, MeshDesc, MeshId,
    ProgramId, Rect, TargetDesc, TargetId, TextureId, TextureRef, UniformKind, UniformValue,
};
use crate::errors::{GloamError, Result};

// ============================================================================
// Command Log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Fullscreen,
    Mesh(MeshId),
}

/// Fixed-function state captured with each draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawState {
    pub viewport: Rect,
    pub scissor: Option<Rect>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            viewport: Rect::default(),
            scissor: None,
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Replace,
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BeginFrame,
    EndFrame,
    Flush,
    CreateTarget {
        target: TargetId,
        label: String,
    },
    DestroyTarget(TargetId),
    BindTarget(TargetId),
    UnbindTarget(TargetId),
    Clear {
        target: TargetId,
        value: ClearValue,
    },
    BlitDepth {
        src: TargetId,
        dst: TargetId,
    },
    SwapColor(TargetId),
    GenerateLuminanceMips(TargetId),
    ReadLuminance {
        target: TargetId,
        value: f32,
    },
    SetViewport(Rect),
    SetScissor(Option<Rect>),
    SetDepthTest(bool),
    SetDepthWrite(bool),
    SetBlend(BlendMode),
    UseProgram(Option<ProgramId>),
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformValue,
    },
    BindTexture {
        unit: u32,
        texture: TextureRef,
    },
    Draw {
        target: TargetId,
        program: ProgramId,
        kind: DrawKind,
        state: DrawState,
        textures: Vec<(u32, TextureRef)>,
    },
    CreateCubemap(CubemapId),
    DestroyCubemap(CubemapId),
    AttachCubeFace {
        target: TargetId,
        cubemap: CubemapId,
        face: CubeFace,
    },
    DetachCubeFace(TargetId),
    InvalidateCubemapMips(CubemapId),
}

// ============================================================================
// Internal Objects
// ============================================================================

/// Physical image identity, used for feedback detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Image {
    Color { owner: TargetId, index: u32, slot: u8 },
    Depth(TargetId),
    Cube(CubemapId),
    External(TextureId),
}

#[derive(Debug, Clone)]
struct Alias {
    source: TargetId,
    attachments: SmallVec<[u32; 4]>,
    depth: bool,
}

#[derive(Debug, Clone)]
struct HeadlessTarget {
    label: String,
    size: UVec2,
    color: SmallVec<[ColorFormat; 4]>,
    has_depth: bool,
    double_buffered: bool,
    front: u8,
    luminance_mips: bool,
    luminance_valid: bool,
    alias: Option<Alias>,
    face: Option<(CubemapId, CubeFace)>,
}

#[derive(Debug, Clone)]
struct HeadlessCubemap {
    size: u32,
    format: ColorFormat,
    mips_valid: bool,
}

#[derive(Debug, Clone, Default)]
struct HeadlessProgram {
    name: String,
    /// Declared uniforms. `None` accepts any name.
    uniforms: Option<FxHashMap<String, UniformKind>>,
    values: FxHashMap<String, UniformValue>,
}

// ============================================================================
// HeadlessContext
// ============================================================================

/// Validating, recording graphics context.
///
/// # Usage
///
/// ```rust,ignore
/// let mut gfx = HeadlessContext::new(UVec2::new(1280, 720));
/// gfx.push_luminance(0.5);
/// renderer.render(&mut gfx, &mut scene, &window);
/// assert_eq!(gfx.draws_with_program("finalizer"), 1);
/// ```
pub struct HeadlessContext {
    screen: TargetId,
    targets: SlotMap<TargetId, HeadlessTarget>,
    cubemaps: SlotMap<CubemapId, HeadlessCubemap>,
    textures: SlotMap<TextureId, UVec2>,
    meshes: SlotMap<MeshId, u32>,
    programs: SlotMap<ProgramId, HeadlessProgram>,
    program_names: FxHashMap<String, ProgramId>,
    failing_programs: FxHashSet<String>,
    failing_targets: FxHashSet<String>,
    strict_programs: bool,

    bind_stack: Vec<TargetId>,
    current_program: Option<ProgramId>,
    units: FxHashMap<u32, TextureRef>,
    state: DrawState,

    luminance: VecDeque<f32>,
    default_luminance: f32,
    fail_next_frame: bool,
    in_frame: bool,

    face_draws: FxHashMap<(CubemapId, CubeFace), u32>,
    commands: Vec<GpuCommand>,
}

impl HeadlessContext {
    /// Creates a context whose screen target has the given size.
    #[must_use]
    pub fn new(screen_size: UVec2) -> Self {
        let mut targets = SlotMap::with_key();
        let screen = targets.insert(HeadlessTarget {
            label: "screen".to_string(),
            size: screen_size,
            color: SmallVec::from_slice(&[ColorFormat::Rgba8Unorm]),
            has_depth: false,
            double_buffered: false,
            front: 0,
            luminance_mips: false,
            luminance_valid: false,
            alias: None,
            face: None,
        });

        Self {
            screen,
            targets,
            cubemaps: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            program_names: FxHashMap::default(),
            failing_programs: FxHashSet::default(),
            failing_targets: FxHashSet::default(),
            strict_programs: false,
            bind_stack: Vec::new(),
            current_program: None,
            units: FxHashMap::default(),
            state: DrawState::default(),
            luminance: VecDeque::new(),
            default_luminance: 0.18,
            fail_next_frame: false,
            in_frame: false,
            face_draws: FxHashMap::default(),
            commands: Vec::new(),
        }
    }

    // === Scripting ===

    /// Queues a value for the next [`read_average_luminance`](GraphicsContext::read_average_luminance).
    pub fn push_luminance(&mut self, value: f32) {
        self.luminance.push_back(value);
    }

    /// Luminance returned once the queue is empty.
    pub fn set_default_luminance(&mut self, value: f32) {
        self.default_luminance = value;
    }

    /// When enabled, only programs registered with
    /// [`register_program`](Self::register_program) can be found.
    pub fn set_strict_programs(&mut self, strict: bool) {
        self.strict_programs = strict;
    }

    /// Registers a program with an explicit uniform interface. Uploads of
    /// undeclared names or mismatched types are rejected.
    pub fn register_program(&mut self, name: &str, uniforms: &[(&str, UniformKind)]) -> ProgramId {
        let declared = uniforms
            .iter()
            .map(|(n, k)| ((*n).to_string(), *k))
            .collect();
        let id = self.programs.insert(HeadlessProgram {
            name: name.to_string(),
            uniforms: Some(declared),
            values: FxHashMap::default(),
        });
        self.program_names.insert(name.to_string(), id);
        id
    }

    /// Makes lookups of `name` fail as if the program did not link.
    pub fn fail_program(&mut self, name: &str) {
        self.failing_programs.insert(name.to_string());
    }

    /// Makes the next creation of a target labelled `label` fail.
    pub fn fail_next_target(&mut self, label: &str) {
        self.failing_targets.insert(label.to_string());
    }

    /// Makes the next [`begin_frame`](GraphicsContext::begin_frame) fail.
    pub fn fail_next_frame(&mut self) {
        self.fail_next_frame = true;
    }

    /// Registers an external texture (LUT, shadow map).
    pub fn register_texture(&mut self, size: UVec2) -> TextureId {
        self.textures.insert(size)
    }

    // === Inspection ===

    #[must_use]
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drains the command log.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Index of the first command matching `pred`.
    pub fn position(&self, pred: impl Fn(&GpuCommand) -> bool) -> Option<usize> {
        self.commands.iter().position(pred)
    }

    #[must_use]
    pub fn program_id(&self, name: &str) -> Option<ProgramId> {
        self.program_names.get(name).copied()
    }

    #[must_use]
    pub fn program_name(&self, program: ProgramId) -> Option<&str> {
        self.programs.get(program).map(|p| p.name.as_str())
    }

    /// Last value uploaded to `uniform` of program `program`.
    #[must_use]
    pub fn uniform(&self, program: &str, uniform: &str) -> Option<UniformValue> {
        let id = self.program_id(program)?;
        self.programs.get(id)?.values.get(uniform).copied()
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { .. }))
            .count()
    }

    #[must_use]
    pub fn draws_with_program(&self, name: &str) -> usize {
        let Some(id) = self.program_id(name) else {
            return 0;
        };
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { program, .. } if *program == id))
            .count()
    }

    #[must_use]
    pub fn draws_into(&self, target: TargetId) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { target: t, .. } if *t == target))
            .count()
    }

    /// Index of the physical image currently acting as the front (render)
    /// attachment of a double-buffered target.
    #[must_use]
    pub fn front_attachment(&self, target: TargetId) -> u8 {
        self.target(target).front
    }

    #[must_use]
    pub fn bind_depth(&self) -> usize {
        self.bind_stack.len()
    }

    #[must_use]
    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    /// No target bound and no program current.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.bind_stack.is_empty() && self.current_program.is_none()
    }

    #[must_use]
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn live_cubemaps(&self) -> usize {
        self.cubemaps.len()
    }

    #[must_use]
    pub fn target_label(&self, target: TargetId) -> Option<&str> {
        self.targets.get(target).map(|t| t.label.as_str())
    }

    #[must_use]
    pub fn cubemap_mips_valid(&self, cubemap: CubemapId) -> bool {
        self.cubemaps.get(cubemap).is_some_and(|c| c.mips_valid)
    }

    /// Draws issued while `face` of `cubemap` was the render attachment.
    #[must_use]
    pub fn face_draw_count(&self, cubemap: CubemapId, face: CubeFace) -> u32 {
        self.face_draws.get(&(cubemap, face)).copied().unwrap_or(0)
    }

    // === Internals ===

    fn record(&mut self, command: GpuCommand) {
        log::trace!("{command:?}");
        self.commands.push(command);
    }

    fn target(&self, id: TargetId) -> &HeadlessTarget {
        self.targets
            .get(id)
            .unwrap_or_else(|| panic!("stale render target handle {id:?}"))
    }

    fn target_mut(&mut self, id: TargetId) -> &mut HeadlessTarget {
        self.targets
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale render target handle {id:?}"))
    }

    /// Slot of attachment 0 that is read from.
    fn readable_slot(t: &HeadlessTarget) -> u8 {
        if t.double_buffered { 1 - t.front } else { 0 }
    }

    fn color_image(&self, owner: TargetId, index: u32, front: bool) -> Image {
        let t = self.target(owner);
        let slot = match (index, t.double_buffered, front) {
            (0, true, true) => t.front,
            (0, true, false) => Self::readable_slot(t),
            _ => 0,
        };
        Image::Color { owner, index, slot }
    }

    /// Images written by a draw into `target`.
    fn draw_images(&self, id: TargetId) -> SmallVec<[Image; 6]> {
        let t = self.target(id);
        let mut images = SmallVec::new();
        if let Some(alias) = &t.alias {
            for &index in &alias.attachments {
                images.push(self.color_image(alias.source, index, true));
            }
            if alias.depth {
                images.push(Image::Depth(alias.source));
            }
            return images;
        }
        for index in 0..t.color.len() as u32 {
            match (index, t.face) {
                (0, Some((cube, _))) => images.push(Image::Cube(cube)),
                _ => images.push(self.color_image(id, index, true)),
            }
        }
        if t.has_depth {
            images.push(Image::Depth(id));
        }
        images
    }

    /// Image a texture reference resolves to at sample time.
    fn sampled_image(&self, texture: TextureRef) -> Image {
        let (owner, index, front) = match texture {
            TextureRef::Color(t) => (t, 0, false),
            TextureRef::History(t) => (t, 0, true),
            TextureRef::Attachment { target, index } => (target, index, false),
            TextureRef::Depth(t) => {
                let source = self.target(t).alias.as_ref().map_or(t, |a| a.source);
                return Image::Depth(source);
            }
            TextureRef::Cubemap(c) => return Image::Cube(c),
            TextureRef::External(x) => return Image::External(x),
        };
        match &self.target(owner).alias {
            Some(alias) => {
                let mapped = alias.attachments.get(index as usize).copied().unwrap_or(index);
                self.color_image(alias.source, mapped, front)
            }
            None => self.color_image(owner, index, front),
        }
    }

    fn check_texture(&self, texture: TextureRef) {
        match texture {
            TextureRef::Color(t) | TextureRef::History(t) | TextureRef::Depth(t) => {
                self.target(t);
            }
            TextureRef::Attachment { target, index } => {
                let t = self.target(target);
                let count = t.alias.as_ref().map_or(t.color.len(), |a| a.attachments.len());
                assert!(
                    (index as usize) < count,
                    "attachment {index} out of range for '{}'",
                    t.label
                );
            }
            TextureRef::Cubemap(c) => assert!(self.cubemaps.contains_key(c), "stale cubemap {c:?}"),
            TextureRef::External(x) => {
                assert!(self.textures.contains_key(x), "stale texture {x:?}");
            }
        }
    }

    fn draw(&mut self, kind: DrawKind) {
        let target = *self
            .bind_stack
            .last()
            .unwrap_or_else(|| panic!("draw issued with no render target bound"));
        let program = self
            .current_program
            .unwrap_or_else(|| panic!("draw issued with no program bound"));

        let written = self.draw_images(target);
        let mut textures: Vec<(u32, TextureRef)> =
            self.units.iter().map(|(unit, tex)| (*unit, *tex)).collect();
        textures.sort_by_key(|(unit, _)| *unit);

        for (unit, texture) in &textures {
            let image = self.sampled_image(*texture);
            let depth_read_only = matches!(image, Image::Depth(_)) && !self.state.depth_write;
            assert!(
                depth_read_only || !written.contains(&image),
                "feedback loop: unit {unit} samples {texture:?} while rendering into '{}'",
                self.target(target).label
            );
            if let TextureRef::Cubemap(c) = texture
                && let Some(cube) = self.cubemaps.get_mut(*c)
            {
                cube.mips_valid = true;
            }
        }

        if let Some(face) = self.target(target).face {
            *self.face_draws.entry(face).or_default() += 1;
        }
        let state = self.state;
        self.record(GpuCommand::Draw {
            target,
            program,
            kind,
            state,
            textures,
        });
    }
}

impl GraphicsContext for HeadlessContext {
    fn begin_frame(&mut self) -> Result<()> {
        assert!(!self.in_frame, "begin_frame called twice");
        if std::mem::take(&mut self.fail_next_frame) {
            return Err(GloamError::SurfaceUnavailable("scripted failure".to_string()));
        }
        self.in_frame = true;
        self.record(GpuCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) {
        assert!(self.in_frame, "end_frame without begin_frame");
        assert!(
            self.bind_stack.is_empty(),
            "frame ended with {} target(s) still bound",
            self.bind_stack.len()
        );
        self.in_frame = false;
        self.record(GpuCommand::EndFrame);
    }

    fn flush(&mut self) {
        self.record(GpuCommand::Flush);
    }

    fn screen(&self) -> TargetId {
        self.screen
    }

    fn screen_size(&self) -> UVec2 {
        self.target(self.screen).size
    }

    fn resize_screen(&mut self, size: UVec2) {
        let screen = self.screen;
        self.target_mut(screen).size = size;
    }

    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        desc.validate()?;
        if self.failing_targets.remove(&desc.label) {
            return Err(GloamError::IncompleteTarget {
                label: desc.label.clone(),
                reason: "scripted allocation failure".to_string(),
            });
        }
        let id = self.targets.insert(HeadlessTarget {
            label: desc.label.clone(),
            size: desc.size,
            color: desc.color.clone(),
            has_depth: desc.depth.is_some(),
            double_buffered: desc.double_buffered,
            front: 0,
            luminance_mips: desc.luminance_mips,
            luminance_valid: false,
            alias: None,
            face: None,
        });
        self.record(GpuCommand::CreateTarget {
            target: id,
            label: desc.label.clone(),
        });
        Ok(id)
    }

    fn create_alias_target(
        &mut self,
        label: &str,
        source: TargetId,
        color_attachments: &[u32],
        with_depth: bool,
    ) -> Result<TargetId> {
        let incomplete = |reason: &str| GloamError::IncompleteTarget {
            label: label.to_string(),
            reason: reason.to_string(),
        };
        let src = self
            .targets
            .get(source)
            .ok_or_else(|| GloamError::UnknownTarget(format!("{source:?}")))?;
        if src.alias.is_some() {
            return Err(incomplete("cannot alias an alias"));
        }
        if color_attachments
            .iter()
            .any(|&i| i as usize >= src.color.len())
        {
            return Err(incomplete("attachment index out of range"));
        }
        if with_depth && !src.has_depth {
            return Err(incomplete("source has no depth attachment"));
        }
        if color_attachments.is_empty() && !with_depth {
            return Err(incomplete("no attachments"));
        }

        let target = HeadlessTarget {
            label: label.to_string(),
            size: src.size,
            color: color_attachments
                .iter()
                .map(|&i| src.color[i as usize])
                .collect(),
            has_depth: with_depth,
            double_buffered: false,
            front: 0,
            luminance_mips: false,
            luminance_valid: false,
            alias: Some(Alias {
                source,
                attachments: SmallVec::from_slice(color_attachments),
                depth: with_depth,
            }),
            face: None,
        };
        let id = self.targets.insert(target);
        self.record(GpuCommand::CreateTarget {
            target: id,
            label: label.to_string(),
        });
        Ok(id)
    }

    fn destroy_target(&mut self, target: TargetId) {
        assert!(
            !self.bind_stack.contains(&target),
            "destroying bound target '{}'",
            self.target(target).label
        );
        if target == self.screen {
            log::warn!("Ignoring request to destroy the screen target");
            return;
        }
        if self.targets.remove(target).is_some() {
            self.record(GpuCommand::DestroyTarget(target));
        }
    }

    fn target_size(&self, target: TargetId) -> Option<UVec2> {
        self.targets.get(target).map(|t| t.size)
    }

    fn bind_target(&mut self, target: TargetId) {
        self.target(target);
        self.bind_stack.push(target);
        self.record(GpuCommand::BindTarget(target));
    }

    fn unbind_target(&mut self, target: TargetId) {
        let top = self.bind_stack.last().copied();
        assert_eq!(
            top,
            Some(target),
            "unbind of {target:?} does not match innermost bound target {top:?}"
        );
        self.bind_stack.pop();
        self.record(GpuCommand::UnbindTarget(target));
    }

    fn bound_target(&self) -> Option<TargetId> {
        self.bind_stack.last().copied()
    }

    fn clear(&mut self, value: ClearValue) {
        let target = *self
            .bind_stack
            .last()
            .unwrap_or_else(|| panic!("clear issued with no render target bound"));
        self.record(GpuCommand::Clear { target, value });
    }

    fn blit_depth(&mut self, src: TargetId, dst: TargetId) {
        let (s, d) = (self.target(src), self.target(dst));
        assert!(s.has_depth && d.has_depth, "depth blit between targets without depth");
        assert_eq!(s.size, d.size, "depth blit size mismatch");
        self.record(GpuCommand::BlitDepth { src, dst });
    }

    fn swap_color_attachments(&mut self, target: TargetId) {
        assert!(
            !self.bind_stack.contains(&target),
            "swapping attachments of bound target '{}'",
            self.target(target).label
        );
        let t = self.target_mut(target);
        assert!(t.double_buffered, "swap on single-buffered target '{}'", t.label);
        t.front = 1 - t.front;
        t.luminance_valid = false;
        self.record(GpuCommand::SwapColor(target));
    }

    fn generate_luminance_mipmaps(&mut self, target: TargetId) {
        let t = self.target_mut(target);
        assert!(t.luminance_mips, "target '{}' has no luminance mip chain", t.label);
        t.luminance_valid = true;
        self.record(GpuCommand::GenerateLuminanceMips(target));
    }

    fn read_average_luminance(&mut self, target: TargetId) -> f32 {
        let t = self.target(target);
        assert!(
            t.luminance_valid,
            "luminance read from stale mip chain of '{}'",
            t.label
        );
        let value = self.luminance.pop_front().unwrap_or(self.default_luminance);
        self.record(GpuCommand::ReadLuminance { target, value });
        value
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.state.viewport = rect;
        self.record(GpuCommand::SetViewport(rect));
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.state.scissor = rect;
        self.record(GpuCommand::SetScissor(rect));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
        self.record(GpuCommand::SetDepthTest(enabled));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
        self.record(GpuCommand::SetDepthWrite(enabled));
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.state.blend = mode;
        self.record(GpuCommand::SetBlend(mode));
    }

    fn find_program(&mut self, name: &str) -> Result<ProgramId> {
        if self.failing_programs.contains(name) {
            return Err(GloamError::ProgramLink {
                name: name.to_string(),
                reason: "scripted link failure".to_string(),
            });
        }
        if let Some(id) = self.program_names.get(name) {
            return Ok(*id);
        }
        if self.strict_programs {
            return Err(GloamError::ProgramNotFound(name.to_string()));
        }
        let id = self.programs.insert(HeadlessProgram {
            name: name.to_string(),
            ..Default::default()
        });
        self.program_names.insert(name.to_string(), id);
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(p) = program {
            assert!(self.programs.contains_key(p), "stale program handle {p:?}");
        }
        if self.current_program != program {
            self.units.clear();
        }
        self.current_program = program;
        self.record(GpuCommand::UseProgram(program));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        let program_id = self
            .current_program
            .unwrap_or_else(|| panic!("uniform '{name}' uploaded with no program bound"));
        let Some(program) = self.programs.get_mut(program_id) else {
            return false;
        };
        if let Some(declared) = &program.uniforms
            && declared.get(name) != Some(&value.kind())
        {
            return false;
        }
        program.values.insert(name.to_string(), value);
        self.record(GpuCommand::SetUniform {
            program: program_id,
            name: name.to_string(),
            value,
        });
        true
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureRef) {
        self.check_texture(texture);
        self.units.insert(unit, texture);
        self.record(GpuCommand::BindTexture { unit, texture });
    }

    fn upload_mesh(&mut self, desc: &MeshDesc<'_>) -> MeshId {
        self.meshes.insert(desc.indices.len() as u32)
    }

    fn draw_fullscreen(&mut self) {
        self.draw(DrawKind::Fullscreen);
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        assert!(self.meshes.contains_key(mesh), "stale mesh handle {mesh:?}");
        self.draw(DrawKind::Mesh(mesh));
    }

    fn create_cubemap(&mut self, label: &str, size: u32, format: ColorFormat) -> Result<CubemapId> {
        if size == 0 {
            return Err(GloamError::IncompleteTarget {
                label: label.to_string(),
                reason: "zero-sized cubemap".to_string(),
            });
        }
        let id = self.cubemaps.insert(HeadlessCubemap {
            size,
            format,
            mips_valid: true,
        });
        self.record(GpuCommand::CreateCubemap(id));
        Ok(id)
    }

    fn destroy_cubemap(&mut self, cubemap: CubemapId) {
        if self.cubemaps.remove(cubemap).is_some() {
            self.record(GpuCommand::DestroyCubemap(cubemap));
        }
    }

    fn cubemap_size(&self, cubemap: CubemapId) -> Option<u32> {
        self.cubemaps.get(cubemap).map(|c| c.size)
    }

    fn cubemap_format(&self, cubemap: CubemapId) -> Option<ColorFormat> {
        self.cubemaps.get(cubemap).map(|c| c.format)
    }

    fn attach_cube_face(
        &mut self,
        target: TargetId,
        cubemap: CubemapId,
        face: CubeFace,
    ) -> Result<()> {
        assert!(
            !self.bind_stack.contains(&target),
            "attaching a cube face to a bound target"
        );
        let cube = self
            .cubemaps
            .get(cubemap)
            .ok_or_else(|| GloamError::UnknownCubemap(format!("{cubemap:?}")))?;
        let (size, format) = (cube.size, cube.format);
        let t = self.target_mut(target);
        assert!(t.alias.is_none(), "cannot attach a cube face to an alias target");
        if t.size != UVec2::splat(size) || t.color.first() != Some(&format) {
            return Err(GloamError::IncompleteTarget {
                label: t.label.clone(),
                reason: format!("cube face is {size}x{size} {format:?}"),
            });
        }
        t.face = Some((cubemap, face));
        self.record(GpuCommand::AttachCubeFace {
            target,
            cubemap,
            face,
        });
        Ok(())
    }

    fn detach_cube_face(&mut self, target: TargetId) {
        assert!(
            !self.bind_stack.contains(&target),
            "detaching a cube face from a bound target"
        );
        self.target_mut(target).face = None;
        self.record(GpuCommand::DetachCubeFace(target));
    }

    fn invalidate_cubemap_mipmaps(&mut self, cubemap: CubemapId) {
        if let Some(cube) = self.cubemaps.get_mut(cubemap) {
            cube.mips_valid = false;
        }
        self.record(GpuCommand::InvalidateCubemapMips(cubemap));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_buffered(gfx: &mut HeadlessContext) -> TargetId {
        let desc = TargetDesc::color("scene", UVec2::new(64, 64), ColorFormat::Rgba16Float)
            .double_buffered();
        gfx.create_target(&desc).unwrap()
    }

    #[test]
    fn history_is_front_and_color_is_back() {
        let mut gfx = HeadlessContext::new(UVec2::new(64, 64));
        let t = double_buffered(&mut gfx);
        assert_eq!(
            gfx.sampled_image(TextureRef::History(t)),
            Image::Color { owner: t, index: 0, slot: 0 }
        );
        assert_eq!(
            gfx.sampled_image(TextureRef::Color(t)),
            Image::Color { owner: t, index: 0, slot: 1 }
        );
    }

    #[test]
    #[should_panic(expected = "feedback loop")]
    fn sampling_the_render_attachment_panics() {
        let mut gfx = HeadlessContext::new(UVec2::new(64, 64));
        let desc = TargetDesc::color("single", UVec2::new(64, 64), ColorFormat::Rgba8Unorm);
        let t = gfx.create_target(&desc).unwrap();
        let p = gfx.find_program("copy").unwrap();
        gfx.bind_target(t);
        gfx.use_program(Some(p));
        gfx.bind_texture(0, TextureRef::Color(t));
        gfx.draw_fullscreen();
    }

    #[test]
    #[should_panic(expected = "does not match innermost")]
    fn out_of_order_unbind_panics() {
        let mut gfx = HeadlessContext::new(UVec2::new(64, 64));
        let a = double_buffered(&mut gfx);
        let b = double_buffered(&mut gfx);
        gfx.bind_target(a);
        gfx.bind_target(b);
        gfx.unbind_target(a);
    }

    #[test]
    fn declared_uniforms_reject_unknown_names() {
        let mut gfx = HeadlessContext::new(UVec2::new(64, 64));
        let p = gfx.register_program("hdr", &[("exposure", UniformKind::Float)]);
        gfx.use_program(Some(p));
        assert!(gfx.set_uniform("exposure", UniformValue::Float(2.0)));
        assert!(!gfx.set_uniform("exposure", UniformValue::Vec2(glam::Vec2::ONE)));
        assert!(!gfx.set_uniform("gamma", UniformValue::Float(2.2)));
        assert_eq!(gfx.uniform("hdr", "exposure"), Some(UniformValue::Float(2.0)));
    }
}
