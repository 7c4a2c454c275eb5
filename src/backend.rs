//! Render Backend Boundary
//!
//! The frame graph never talks to a GPU API directly. Everything that touches
//! real hardware goes through [`RenderBackend`]: texture and frame buffer
//! allocation, color target attachment, texture binding, draws, and render
//! state.
//!
//! Physical objects handed out by the backend are lightweight `Copy` handles
//! ([`Texture2d`], [`FrameBuffer`]) carrying their descriptor, so passes can
//! validate shapes without a round trip.
//!
//! [`HeadlessBackend`] is a recording implementation without a device. It is
//! used by the test suite and the benchmarks, and is handy for dry-running a
//! pass layout.

use std::any::Any;
use std::fmt;

use bitflags::bitflags;
use glam::UVec2;
use rustc_hash::FxHashMap;

use crate::errors::BackendError;
use crate::view::DepthRange;

// ─── Descriptors & Handles ────────────────────────────────────────────────────

/// Describes a 2D texture allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub size: UVec2,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    /// Usage flags for a texture that is rendered to and sampled afterwards.
    pub const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
        .union(wgpu::TextureUsages::TEXTURE_BINDING);

    /// Creates a render-target descriptor of the given size and format.
    #[must_use]
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            size: UVec2::new(width, height),
            format,
            usage: Self::TARGET_USAGE,
        }
    }
}

impl fmt::Display for TextureDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Texture2d({}x{} {:?})", self.size.x, self.size.y, self.format)
    }
}

/// Describes a frame buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameBufferDesc {
    pub size: UVec2,
    pub samples: u32,
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl FrameBufferDesc {
    /// Single-sampled frame buffer without a depth attachment.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: UVec2::new(width, height),
            samples: 1,
            depth_format: None,
        }
    }

    #[must_use]
    pub fn with_depth(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }
}

impl fmt::Display for FrameBufferDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameBuffer({}x{} x{})",
            self.size.x, self.size.y, self.samples
        )
    }
}

/// Backend handle to a 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture2d {
    handle: u64,
    desc: TextureDesc,
}

impl Texture2d {
    /// Wraps a backend handle. Only backends should call this.
    #[must_use]
    pub fn from_raw(handle: u64, desc: TextureDesc) -> Self {
        Self { handle, desc }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.desc.size
    }
}

/// Backend handle to a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameBuffer {
    handle: u64,
    desc: FrameBufferDesc,
}

impl FrameBuffer {
    /// Wraps a backend handle. Only backends should call this.
    #[must_use]
    pub fn from_raw(handle: u64, desc: FrameBufferDesc) -> Self {
        Self { handle, desc }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &FrameBufferDesc {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.desc.size
    }
}

bitflags! {
    /// Buffers cleared by [`RenderBackend::clear`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Scene geometry categories a pass can ask the backend to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryBucket {
    Opaque,
    Sky,
    Transparent,
    Translucent,
    Gui,
}

// ─── Backend Trait ────────────────────────────────────────────────────────────

/// Opaque render backend driven by passes.
///
/// The `Any` supertrait lets callers recover the concrete backend from the
/// [`RenderContext`](crate::context::RenderContext).
pub trait RenderBackend: Any {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Texture2d, BackendError>;

    fn dispose_texture(&mut self, texture: &Texture2d);

    fn create_frame_buffer(&mut self, desc: &FrameBufferDesc)
    -> Result<FrameBuffer, BackendError>;

    fn dispose_frame_buffer(&mut self, frame_buffer: &FrameBuffer);

    /// Attaches `texture` as color target `index` of `frame_buffer`.
    fn attach_color_target(
        &mut self,
        frame_buffer: &FrameBuffer,
        index: u32,
        texture: &Texture2d,
    ) -> Result<(), BackendError>;

    /// Binds `texture` to a named material slot for the next draw.
    fn bind_texture(&mut self, slot: &str, texture: &Texture2d) -> Result<(), BackendError>;

    /// Draws a full-screen triangle with the currently bound state.
    fn draw_fullscreen(&mut self, label: &str) -> Result<(), BackendError>;

    /// Draws one bucket of the scene render queue.
    fn draw_geometry(&mut self, bucket: GeometryBucket) -> Result<(), BackendError>;

    /// Sets the active frame buffer. `None` targets the surface.
    fn set_frame_buffer(&mut self, frame_buffer: Option<&FrameBuffer>);

    fn set_depth_range(&mut self, range: DepthRange);

    fn clear(&mut self, flags: ClearFlags);
}

// ─── Headless Backend ─────────────────────────────────────────────────────────

/// A command recorded by [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateTexture(u64),
    DisposeTexture(u64),
    CreateFrameBuffer(u64),
    DisposeFrameBuffer(u64),
    AttachColorTarget { frame_buffer: u64, index: u32, texture: u64 },
    BindTexture { slot: String, texture: u64 },
    DrawFullscreen(String),
    DrawGeometry(GeometryBucket),
    SetFrameBuffer(Option<u64>),
    SetDepthRange(DepthRange),
    Clear(ClearFlags),
}

/// Counters kept by [`HeadlessBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub textures_created: u32,
    pub textures_disposed: u32,
    pub frame_buffers_created: u32,
    pub frame_buffers_disposed: u32,
    pub draws: u32,
    /// Dispose calls for handles that were not alive.
    pub invalid_disposals: u32,
}

/// Device-less backend that records every call.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    textures: FxHashMap<u64, TextureDesc>,
    frame_buffers: FxHashMap<u64, FrameBufferDesc>,
    commands: Vec<BackendCommand>,
    stats: BackendStats,
    fail_allocations: bool,
    active_frame_buffer: Option<u64>,
    depth_range: DepthRange,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    #[must_use]
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drops the command log, keeping counters and live handles.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn live_frame_buffers(&self) -> usize {
        self.frame_buffers.len()
    }

    #[must_use]
    pub fn is_texture_alive(&self, texture: &Texture2d) -> bool {
        self.textures.contains_key(&texture.handle)
    }

    #[must_use]
    pub fn active_frame_buffer(&self) -> Option<u64> {
        self.active_frame_buffer
    }

    #[must_use]
    pub fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    /// Makes every following allocation fail with
    /// [`BackendError::AllocationFailed`].
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    fn allocate_handle(&mut self, what: &str) -> Result<u64, BackendError> {
        if self.fail_allocations {
            return Err(BackendError::AllocationFailed(what.to_string()));
        }
        self.next_handle += 1;
        Ok(self.next_handle)
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Texture2d, BackendError> {
        let handle = self.allocate_handle(&desc.to_string())?;
        self.textures.insert(handle, *desc);
        self.stats.textures_created += 1;
        self.commands.push(BackendCommand::CreateTexture(handle));
        Ok(Texture2d::from_raw(handle, *desc))
    }

    fn dispose_texture(&mut self, texture: &Texture2d) {
        if self.textures.remove(&texture.handle).is_some() {
            self.stats.textures_disposed += 1;
            self.commands
                .push(BackendCommand::DisposeTexture(texture.handle));
        } else {
            log::warn!("Disposing unknown texture handle {}", texture.handle);
            self.stats.invalid_disposals += 1;
        }
    }

    fn create_frame_buffer(
        &mut self,
        desc: &FrameBufferDesc,
    ) -> Result<FrameBuffer, BackendError> {
        let handle = self.allocate_handle(&desc.to_string())?;
        self.frame_buffers.insert(handle, *desc);
        self.stats.frame_buffers_created += 1;
        self.commands.push(BackendCommand::CreateFrameBuffer(handle));
        Ok(FrameBuffer::from_raw(handle, *desc))
    }

    fn dispose_frame_buffer(&mut self, frame_buffer: &FrameBuffer) {
        if self.frame_buffers.remove(&frame_buffer.handle).is_some() {
            self.stats.frame_buffers_disposed += 1;
            self.commands
                .push(BackendCommand::DisposeFrameBuffer(frame_buffer.handle));
        } else {
            log::warn!("Disposing unknown frame buffer handle {}", frame_buffer.handle);
            self.stats.invalid_disposals += 1;
        }
    }

    fn attach_color_target(
        &mut self,
        frame_buffer: &FrameBuffer,
        index: u32,
        texture: &Texture2d,
    ) -> Result<(), BackendError> {
        if !self.frame_buffers.contains_key(&frame_buffer.handle) {
            return Err(BackendError::InvalidHandle(frame_buffer.handle));
        }
        if !self.textures.contains_key(&texture.handle) {
            return Err(BackendError::InvalidHandle(texture.handle));
        }
        self.commands.push(BackendCommand::AttachColorTarget {
            frame_buffer: frame_buffer.handle,
            index,
            texture: texture.handle,
        });
        Ok(())
    }

    fn bind_texture(&mut self, slot: &str, texture: &Texture2d) -> Result<(), BackendError> {
        if !self.textures.contains_key(&texture.handle) {
            return Err(BackendError::InvalidHandle(texture.handle));
        }
        self.commands.push(BackendCommand::BindTexture {
            slot: slot.to_string(),
            texture: texture.handle,
        });
        Ok(())
    }

    fn draw_fullscreen(&mut self, label: &str) -> Result<(), BackendError> {
        self.stats.draws += 1;
        self.commands
            .push(BackendCommand::DrawFullscreen(label.to_string()));
        Ok(())
    }

    fn draw_geometry(&mut self, bucket: GeometryBucket) -> Result<(), BackendError> {
        self.stats.draws += 1;
        self.commands.push(BackendCommand::DrawGeometry(bucket));
        Ok(())
    }

    fn set_frame_buffer(&mut self, frame_buffer: Option<&FrameBuffer>) {
        let handle = frame_buffer.map(FrameBuffer::handle);
        if self.active_frame_buffer != handle {
            self.active_frame_buffer = handle;
            self.commands.push(BackendCommand::SetFrameBuffer(handle));
        }
    }

    fn set_depth_range(&mut self, range: DepthRange) {
        if self.depth_range != range {
            self.depth_range = range;
            self.commands.push(BackendCommand::SetDepthRange(range));
        }
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.commands.push(BackendCommand::Clear(flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_tracks_live_handles() {
        let mut backend = HeadlessBackend::new();
        let desc = TextureDesc::new(64, 64, wgpu::TextureFormat::Rgba8Unorm);
        let texture = backend.create_texture(&desc).unwrap();
        assert!(backend.is_texture_alive(&texture));

        backend.dispose_texture(&texture);
        backend.dispose_texture(&texture);

        let stats = backend.stats();
        assert_eq!(stats.textures_created, 1);
        assert_eq!(stats.textures_disposed, 1);
        assert_eq!(stats.invalid_disposals, 1);
    }

    #[test]
    fn test_headless_allocation_failure() {
        let mut backend = HeadlessBackend::new();
        backend.set_fail_allocations(true);
        let result = backend.create_frame_buffer(&FrameBufferDesc::new(8, 8));
        assert!(matches!(result, Err(BackendError::AllocationFailed(_))));
    }
}
