//! Shared fixtures for the integration tests.
//!
//! Every pass here records what happened to it so tests can assert on
//! execution counts and the physical objects it was handed.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use glam::UVec2;
use myth_framegraph::prelude::*;
use myth_framegraph::{BackendStats, GraphStep, Profiler};
use wgpu::TextureFormat;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Graph over a headless backend with an 800x600 viewport.
pub fn new_graph() -> FrameGraph {
    graph_with(FrameGraphSettings::default().with_viewport(800, 600))
}

pub fn graph_with(settings: FrameGraphSettings) -> FrameGraph {
    init_logger();
    FrameGraph::new(HeadlessBackend::new(), &settings)
}

pub fn headless(graph: &FrameGraph) -> &HeadlessBackend {
    graph
        .backend::<HeadlessBackend>()
        .expect("graph runs on the headless backend")
}

pub fn stats(graph: &FrameGraph) -> BackendStats {
    headless(graph).stats()
}

/// One logical frame: execute, then signal completion.
pub fn run_frame(graph: &mut FrameGraph) {
    graph.execute().expect("frame executes");
    graph.rendering_complete();
}

pub fn run_frames(graph: &mut FrameGraph, count: usize) {
    for _ in 0..count {
        run_frame(graph);
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Declares one `Color` texture and draws opaque geometry into it.
///
/// The texture follows the viewport unless `size` is set. With
/// `frame_buffer` the pass owns a camera-sized frame buffer and attaches
/// the texture to it as color target 0.
pub struct ProducerPass {
    pub color: ResourceTicket<Texture2d>,
    pub size: Option<UVec2>,
    pub format: TextureFormat,
    pub timeout: Option<u32>,
    pub declare: bool,
    pub forced: bool,
    pub reserve: bool,
    pub constant: bool,
    pub frame_buffer: bool,
    pub executions: u32,
    pub last_texture: Option<Texture2d>,
}

impl Default for ProducerPass {
    fn default() -> Self {
        Self {
            color: ResourceTicket::default(),
            size: None,
            format: TextureFormat::Rgba8Unorm,
            timeout: None,
            declare: true,
            forced: false,
            reserve: false,
            constant: false,
            frame_buffer: false,
            executions: 0,
            last_texture: None,
        }
    }
}

impl ProducerPass {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            size: Some(UVec2::new(width, height)),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, frames: u32) -> Self {
        self.timeout = Some(frames);
        self
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    pub fn reserving(mut self) -> Self {
        self.reserve = true;
        self
    }

    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn with_frame_buffer(mut self) -> Self {
        self.frame_buffer = true;
        self
    }
}

impl RenderPass for ProducerPass {
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.color = ctx.add_output("Color");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        if !self.declare {
            return Ok(());
        }
        let size = self.size.unwrap_or_else(|| ctx.viewport_size());
        let mut def = TextureDef::new(size.x, size.y, self.format);
        if let Some(frames) = self.timeout {
            def = def.with_timeout(frames);
        }
        ctx.declare(def, self.color)?;
        if self.reserve {
            ctx.reserve(self.color)?;
        }
        if self.constant {
            ctx.make_constant(self.color)?;
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
        self.executions += 1;
        if !self.declare {
            return Ok(());
        }
        let texture = match ctx.frame_buffer() {
            Some(frame_buffer) => {
                let targets = ctx.acquire_color_targets(&frame_buffer, &[self.color])?;
                ctx.render().push_frame_buffer(frame_buffer);
                targets[0]
            }
            None => ctx.acquire(self.color)?,
        };
        ctx.backend().draw_geometry(GeometryBucket::Opaque)?;
        self.last_texture = Some(texture);
        Ok(())
    }

    fn is_used(&self, referenced: bool) -> bool {
        self.forced || referenced
    }

    fn create_frame_buffer(
        &mut self,
        ctx: &mut myth_framegraph::RenderContext,
    ) -> Result<Option<FrameBuffer>> {
        if !self.frame_buffer {
            return Ok(None);
        }
        let size = ctx.viewport().size();
        let desc = FrameBufferDesc::new(size.x, size.y);
        Ok(Some(ctx.backend_mut().create_frame_buffer(&desc)?))
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Reads one `Input` texture and draws it full-screen.
///
/// `required` switches between a hard and a soft reference.
pub struct ConsumerPass {
    pub input: ResourceTicket<Texture2d>,
    pub required: bool,
    pub forced: bool,
    pub executions: u32,
    pub last_input: Option<Texture2d>,
}

impl Default for ConsumerPass {
    fn default() -> Self {
        Self {
            input: ResourceTicket::default(),
            required: true,
            forced: false,
            executions: 0,
            last_input: None,
        }
    }
}

impl ConsumerPass {
    pub fn optional() -> Self {
        Self {
            required: false,
            ..Self::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }
}

impl RenderPass for ConsumerPass {
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.input = ctx.add_input("Input");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        if self.required {
            ctx.reference(self.input)
        } else {
            ctx.reference_optional(self.input);
            Ok(())
        }
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
        self.executions += 1;
        self.last_input = ctx.acquire_optional(self.input)?;
        if let Some(texture) = self.last_input {
            ctx.backend().bind_texture("Input", &texture)?;
        }
        ctx.backend().draw_fullscreen("Consumer")?;
        Ok(())
    }

    fn is_used(&self, referenced: bool) -> bool {
        self.forced || referenced
    }
}

/// Wires `consumer`'s `Input` to `producer`'s `Color`.
pub fn link(graph: &mut FrameGraph, producer: PassId, consumer: PassId) {
    let input = graph
        .input::<Texture2d>(consumer, "Input")
        .expect("consumer has an Input ticket");
    graph
        .connect_to_output(producer, "Color", input)
        .expect("producer has a Color ticket");
}

// ============================================================================
// Scripted
// ============================================================================

/// What a [`ScriptedPass`] does during execute.
pub type Script = Box<dyn FnMut(&mut ExecuteContext<'_>) -> Result<()>>;

/// Always-used pass whose execute body is a closure.
pub struct ScriptedPass {
    pub script: Script,
    pub executions: u32,
}

impl ScriptedPass {
    pub fn new(script: impl FnMut(&mut ExecuteContext<'_>) -> Result<()> + 'static) -> Self {
        Self {
            script: Box::new(script),
            executions: 0,
        }
    }
}

impl RenderPass for ScriptedPass {
    fn prepare(&mut self, _ctx: &mut PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
        self.executions += 1;
        (self.script)(ctx)
    }

    fn is_used(&self, _referenced: bool) -> bool {
        true
    }
}

// ============================================================================
// Profiler
// ============================================================================

/// Collects every marker as a string.
#[derive(Clone, Default)]
pub struct RecordingProfiler {
    pub events: Rc<RefCell<Vec<String>>>,
}

impl Profiler for RecordingProfiler {
    fn graph_step(&mut self, step: GraphStep) {
        self.events.borrow_mut().push(step.name().to_string());
    }

    fn pass_step(&mut self, pass_name: &str) {
        self.events.borrow_mut().push(format!("pass:{pass_name}"));
    }
}
