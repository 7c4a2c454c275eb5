//! Render Context
//!
//! Per-frame state shared by every stage call: the render backend, viewport,
//! time per frame, optional profiler, and the render settings stack.
//!
//! # Render Settings Stack
//!
//! Passes may push frame-buffer overrides and change the depth range while
//! they execute. The graph takes a [`SettingsMark`] before every pass and
//! restores it afterwards, so no pass leaks state into the next one.
//!
//! ```text
//! mark = ctx.save_settings()      // before pass N
//!   ctx.push_frame_buffer(fb)     // inside pass N
//!   ctx.set_depth_range(FRONT)
//! ctx.restore_settings(mark)      // after pass N: stack + depth range restored
//! ```

use std::any::Any;

use glam::UVec2;

use crate::backend::{FrameBuffer, RenderBackend};
use crate::errors::Result;
use crate::graph::GraphStep;
use crate::profiler::Profiler;
use crate::view::{DepthRange, Viewport};

/// Snapshot of the render settings taken by [`RenderContext::save_settings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingsMark {
    frame_buffer_depth: usize,
    depth_range: DepthRange,
}

/// Shared per-frame rendering state.
pub struct RenderContext {
    backend: Box<dyn RenderBackend>,
    viewport: Viewport,
    tpf: f32,
    profiler: Option<Box<dyn Profiler>>,
    frame_buffers: Vec<FrameBuffer>,
    depth_range: DepthRange,
}

impl RenderContext {
    #[must_use]
    pub fn new(backend: Box<dyn RenderBackend>, viewport_size: UVec2) -> Self {
        Self {
            backend,
            viewport: Viewport::new(viewport_size),
            tpf: 0.0,
            profiler: None,
            frame_buffers: Vec::new(),
            depth_range: DepthRange::IDENTITY,
        }
    }

    // ─── Backend ──────────────────────────────────────────────────────────────

    #[inline]
    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    /// Downcasts the backend to its concrete type.
    #[must_use]
    pub fn backend_as<B: RenderBackend>(&self) -> Option<&B> {
        (self.backend.as_ref() as &dyn Any).downcast_ref::<B>()
    }

    /// Downcasts the backend to its concrete type.
    pub fn backend_as_mut<B: RenderBackend>(&mut self) -> Option<&mut B> {
        (self.backend.as_mut() as &mut dyn Any).downcast_mut::<B>()
    }

    // ─── Viewport & Timing ────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.viewport.width()
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.viewport.height()
    }

    /// Returns `true` if the size changed.
    pub fn resize(&mut self, size: UVec2) -> bool {
        self.viewport.resize(size)
    }

    /// Seconds elapsed since the previous frame.
    #[inline]
    #[must_use]
    pub fn tpf(&self) -> f32 {
        self.tpf
    }

    pub fn set_tpf(&mut self, tpf: f32) {
        self.tpf = tpf;
    }

    // ─── Profiler ─────────────────────────────────────────────────────────────

    pub fn set_profiler(&mut self, profiler: Option<Box<dyn Profiler>>) {
        self.profiler = profiler;
    }

    #[must_use]
    pub fn has_profiler(&self) -> bool {
        self.profiler.is_some()
    }

    pub(crate) fn profile_step(&mut self, step: GraphStep) {
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.graph_step(step);
        }
    }

    pub(crate) fn profile_pass(&mut self, pass_name: &str) {
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.pass_step(pass_name);
        }
    }

    // ─── Render Settings Stack ────────────────────────────────────────────────

    /// Makes `frame_buffer` the active target until it is popped or the
    /// current pass ends.
    pub fn push_frame_buffer(&mut self, frame_buffer: FrameBuffer) {
        self.frame_buffers.push(frame_buffer);
        self.backend.set_frame_buffer(Some(&frame_buffer));
    }

    /// Pops the most recent override and re-binds the one below it.
    pub fn pop_frame_buffer(&mut self) -> Option<FrameBuffer> {
        let popped = self.frame_buffers.pop();
        self.backend.set_frame_buffer(self.frame_buffers.last());
        popped
    }

    /// The active frame buffer, `None` for the surface.
    #[must_use]
    pub fn frame_buffer(&self) -> Option<&FrameBuffer> {
        self.frame_buffers.last()
    }

    #[inline]
    #[must_use]
    pub fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    pub fn set_depth_range(&mut self, range: DepthRange) -> Result<()> {
        range.validate()?;
        self.depth_range = range;
        self.backend.set_depth_range(range);
        Ok(())
    }

    #[must_use]
    pub fn save_settings(&self) -> SettingsMark {
        SettingsMark {
            frame_buffer_depth: self.frame_buffers.len(),
            depth_range: self.depth_range,
        }
    }

    /// Pops frame buffers pushed after `mark` and restores the depth range.
    pub fn restore_settings(&mut self, mark: SettingsMark) {
        if self.frame_buffers.len() > mark.frame_buffer_depth {
            self.frame_buffers.truncate(mark.frame_buffer_depth);
            self.backend.set_frame_buffer(self.frame_buffers.last());
        }
        if self.depth_range != mark.depth_range {
            self.depth_range = mark.depth_range;
            self.backend.set_depth_range(mark.depth_range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FrameBufferDesc, HeadlessBackend};

    #[test]
    fn test_restore_pops_pushed_frame_buffers() {
        let mut ctx = RenderContext::new(Box::new(HeadlessBackend::new()), UVec2::new(64, 64));
        let fb = ctx
            .backend_mut()
            .create_frame_buffer(&FrameBufferDesc::new(64, 64))
            .unwrap();

        let mark = ctx.save_settings();
        ctx.push_frame_buffer(fb);
        ctx.push_frame_buffer(fb);
        ctx.set_depth_range(DepthRange::FRONT).unwrap();

        ctx.restore_settings(mark);
        assert!(ctx.frame_buffer().is_none());
        assert_eq!(ctx.depth_range(), DepthRange::IDENTITY);

        let backend = ctx.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(backend.active_frame_buffer(), None);
        assert_eq!(backend.depth_range(), DepthRange::IDENTITY);
    }
}
