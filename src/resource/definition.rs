//! Resource Definitions
//!
//! A definition tells the pool how to build, reuse and dispose one kind of
//! physical object, together with its reuse policy:
//!
//! | Policy | Default | Effect |
//! |--------|---------|--------|
//! | `static_timeout` | `None` | Idle frames survived, `max(static, pool default)` |
//! | `use_existing` | `true` | Try to reuse a compatible pooled object before creating |
//! | `dispose_on_release` | `false` | Dispose as soon as the last user releases it |
//!
//! Disposal resolves in order: the definition's explicit disposer, then the
//! object's native disposal contract ([`NativeObject`]), then a no-op.
//!
//! Built-in definitions: [`ValueDef`] (arbitrary CPU-side values),
//! [`TextureDef`] and [`FrameBufferDef`].

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::backend::{FrameBuffer, FrameBufferDesc, RenderBackend, Texture2d, TextureDesc};
use crate::errors::BackendError;

// ─── Shape ────────────────────────────────────────────────────────────────────

/// Compatibility key of a pooled object. Two objects with equal shapes are
/// interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceShape {
    Value(TypeId),
    Texture(TextureDesc),
    FrameBuffer(FrameBufferDesc),
}

impl fmt::Display for ResourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(id) => write!(f, "Value({id:?})"),
            Self::Texture(desc) => desc.fmt(f),
            Self::FrameBuffer(desc) => desc.fmt(f),
        }
    }
}

// ─── Disposal ─────────────────────────────────────────────────────────────────

/// Objects that know how to release themselves through the backend.
pub trait NativeObject: Sized + 'static {
    fn dispose(self, backend: &mut dyn RenderBackend);
}

impl NativeObject for Texture2d {
    fn dispose(self, backend: &mut dyn RenderBackend) {
        backend.dispose_texture(&self);
    }
}

impl NativeObject for FrameBuffer {
    fn dispose(self, backend: &mut dyn RenderBackend) {
        backend.dispose_frame_buffer(&self);
    }
}

/// Typed explicit disposer.
pub type Disposer<T> = Rc<dyn Fn(T, &mut dyn RenderBackend)>;

pub(crate) type ErasedDisposer = Rc<dyn Fn(Box<dyn Any>, &mut dyn RenderBackend)>;

/// Which disposer a pooled object resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposerKind {
    Explicit,
    Native,
    Noop,
}

pub(crate) enum Disposal {
    Explicit(ErasedDisposer),
    Native(ErasedDisposer),
    Noop,
}

impl Disposal {
    pub(crate) fn kind(&self) -> DisposerKind {
        match self {
            Self::Explicit(_) => DisposerKind::Explicit,
            Self::Native(_) => DisposerKind::Native,
            Self::Noop => DisposerKind::Noop,
        }
    }

    pub(crate) fn run(&self, object: Box<dyn Any>, backend: &mut dyn RenderBackend) {
        match self {
            Self::Explicit(dispose) | Self::Native(dispose) => dispose(object, backend),
            Self::Noop => {}
        }
    }
}

// ─── Definition Trait ─────────────────────────────────────────────────────────

/// How to create, reuse and dispose one physical resource type.
pub trait ResourceDef: 'static {
    /// The physical object handed out on acquire.
    type Object: 'static;

    fn shape(&self) -> ResourceShape;

    /// Builds a fresh object. `Ok(None)` means the definition could not
    /// produce one and is reported as a validation fault.
    fn create(&self, backend: &mut dyn RenderBackend)
    -> Result<Option<Self::Object>, BackendError>;

    /// Prepares a pooled object for reuse. Returning `false` rejects it.
    fn apply(&self, _object: &mut Self::Object) -> bool {
        false
    }

    fn disposer(&self) -> Option<Disposer<Self::Object>> {
        None
    }

    fn native_disposer(&self) -> Option<fn(Self::Object, &mut dyn RenderBackend)> {
        None
    }

    fn static_timeout(&self) -> Option<u32> {
        None
    }

    fn use_existing(&self) -> bool {
        true
    }

    fn dispose_on_release(&self) -> bool {
        false
    }
}

/// Object-safe view of a [`ResourceDef`], stored per frame by the registry.
pub(crate) trait ErasedDef {
    fn shape(&self) -> ResourceShape;
    fn object_type(&self) -> TypeId;
    fn create(&self, backend: &mut dyn RenderBackend)
    -> Result<Option<Box<dyn Any>>, BackendError>;
    fn apply(&self, object: &mut dyn Any) -> bool;
    fn disposal(&self) -> Disposal;
    fn static_timeout(&self) -> Option<u32>;
    fn use_existing(&self) -> bool;
    fn dispose_on_release(&self) -> bool;
}

impl<D: ResourceDef> ErasedDef for D {
    fn shape(&self) -> ResourceShape {
        ResourceDef::shape(self)
    }

    fn object_type(&self) -> TypeId {
        TypeId::of::<D::Object>()
    }

    fn create(
        &self,
        backend: &mut dyn RenderBackend,
    ) -> Result<Option<Box<dyn Any>>, BackendError> {
        Ok(ResourceDef::create(self, backend)?.map(|object| Box::new(object) as Box<dyn Any>))
    }

    fn apply(&self, object: &mut dyn Any) -> bool {
        object
            .downcast_mut::<D::Object>()
            .is_some_and(|object| ResourceDef::apply(self, object))
    }

    fn disposal(&self) -> Disposal {
        if let Some(dispose) = ResourceDef::disposer(self) {
            Disposal::Explicit(Rc::new(move |object: Box<dyn Any>, backend: &mut dyn RenderBackend| {
                if let Ok(object) = object.downcast::<D::Object>() {
                    dispose(*object, backend);
                }
            }))
        } else if let Some(dispose) = ResourceDef::native_disposer(self) {
            Disposal::Native(Rc::new(move |object: Box<dyn Any>, backend: &mut dyn RenderBackend| {
                if let Ok(object) = object.downcast::<D::Object>() {
                    dispose(*object, backend);
                }
            }))
        } else {
            Disposal::Noop
        }
    }

    fn static_timeout(&self) -> Option<u32> {
        ResourceDef::static_timeout(self)
    }

    fn use_existing(&self) -> bool {
        ResourceDef::use_existing(self)
    }

    fn dispose_on_release(&self) -> bool {
        ResourceDef::dispose_on_release(self)
    }
}

// ─── ValueDef ─────────────────────────────────────────────────────────────────

/// Definition of a CPU-side value.
///
/// Without a reset function pooled values are never reused, a fresh one is
/// created every frame and the stale ones age out of the pool.
///
/// ```rust,ignore
/// let def = ValueDef::new(|| Some(Vec::<LightData>::with_capacity(64)))
///     .with_reset(|lights| { lights.clear(); true })
///     .with_timeout(4);
/// ctx.declare(def, self.lights)?;
/// ```
pub struct ValueDef<T> {
    create: Rc<dyn Fn() -> Option<T>>,
    reset: Option<Rc<dyn Fn(&mut T) -> bool>>,
    disposer: Option<Disposer<T>>,
    native: Option<fn(T, &mut dyn RenderBackend)>,
    static_timeout: Option<u32>,
    use_existing: bool,
    dispose_on_release: bool,
}

impl<T: 'static> ValueDef<T> {
    pub fn new(create: impl Fn() -> Option<T> + 'static) -> Self {
        Self {
            create: Rc::new(create),
            reset: None,
            disposer: None,
            native: None,
            static_timeout: None,
            use_existing: true,
            dispose_on_release: false,
        }
    }

    /// Allows pooled values to be reused after `reset` succeeds on them.
    #[must_use]
    pub fn with_reset(mut self, reset: impl Fn(&mut T) -> bool + 'static) -> Self {
        self.reset = Some(Rc::new(reset));
        self
    }

    #[must_use]
    pub fn with_disposer(mut self, dispose: impl Fn(T, &mut dyn RenderBackend) + 'static) -> Self {
        self.disposer = Some(Rc::new(dispose));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, frames: u32) -> Self {
        self.static_timeout = Some(frames);
        self
    }

    #[must_use]
    pub fn with_use_existing(mut self, use_existing: bool) -> Self {
        self.use_existing = use_existing;
        self
    }

    #[must_use]
    pub fn with_dispose_on_release(mut self, dispose: bool) -> Self {
        self.dispose_on_release = dispose;
        self
    }
}

impl<T: NativeObject> ValueDef<T> {
    /// Falls back to the value's own disposal contract when no explicit
    /// disposer is set.
    #[must_use]
    pub fn native(mut self) -> Self {
        self.native = Some(T::dispose);
        self
    }
}

impl<T> Clone for ValueDef<T> {
    fn clone(&self) -> Self {
        Self {
            create: Rc::clone(&self.create),
            reset: self.reset.clone(),
            disposer: self.disposer.clone(),
            native: self.native,
            static_timeout: self.static_timeout,
            use_existing: self.use_existing,
            dispose_on_release: self.dispose_on_release,
        }
    }
}

impl<T: 'static> ResourceDef for ValueDef<T> {
    type Object = T;

    fn shape(&self) -> ResourceShape {
        ResourceShape::Value(TypeId::of::<T>())
    }

    fn create(&self, _backend: &mut dyn RenderBackend) -> Result<Option<T>, BackendError> {
        Ok((self.create)())
    }

    fn apply(&self, object: &mut T) -> bool {
        self.reset.as_ref().is_some_and(|reset| reset(object))
    }

    fn disposer(&self) -> Option<Disposer<T>> {
        self.disposer.clone()
    }

    fn native_disposer(&self) -> Option<fn(T, &mut dyn RenderBackend)> {
        self.native
    }

    fn static_timeout(&self) -> Option<u32> {
        self.static_timeout
    }

    fn use_existing(&self) -> bool {
        self.use_existing
    }

    fn dispose_on_release(&self) -> bool {
        self.dispose_on_release
    }
}

// ─── TextureDef ───────────────────────────────────────────────────────────────

/// Definition of a 2D render target texture.
#[derive(Clone)]
pub struct TextureDef {
    desc: TextureDesc,
    static_timeout: Option<u32>,
    disposer: Option<Disposer<Texture2d>>,
}

impl TextureDef {
    #[must_use]
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self::from_desc(TextureDesc::new(width, height, format))
    }

    #[must_use]
    pub fn from_desc(desc: TextureDesc) -> Self {
        Self {
            desc,
            static_timeout: None,
            disposer: None,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.desc.usage = usage;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, frames: u32) -> Self {
        self.static_timeout = Some(frames);
        self
    }

    /// Overrides the native texture disposal.
    #[must_use]
    pub fn with_disposer(
        mut self,
        dispose: impl Fn(Texture2d, &mut dyn RenderBackend) + 'static,
    ) -> Self {
        self.disposer = Some(Rc::new(dispose));
        self
    }

    #[must_use]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

impl ResourceDef for TextureDef {
    type Object = Texture2d;

    fn shape(&self) -> ResourceShape {
        ResourceShape::Texture(self.desc)
    }

    fn create(&self, backend: &mut dyn RenderBackend) -> Result<Option<Texture2d>, BackendError> {
        backend.create_texture(&self.desc).map(Some)
    }

    fn apply(&self, texture: &mut Texture2d) -> bool {
        texture.desc() == &self.desc
    }

    fn disposer(&self) -> Option<Disposer<Texture2d>> {
        self.disposer.clone()
    }

    fn native_disposer(&self) -> Option<fn(Texture2d, &mut dyn RenderBackend)> {
        Some(Texture2d::dispose)
    }

    fn static_timeout(&self) -> Option<u32> {
        self.static_timeout
    }
}

// ─── FrameBufferDef ───────────────────────────────────────────────────────────

/// Definition of a pooled frame buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameBufferDef {
    desc: FrameBufferDesc,
    static_timeout: Option<u32>,
}

impl FrameBufferDef {
    #[must_use]
    pub fn new(desc: FrameBufferDesc) -> Self {
        Self {
            desc,
            static_timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, frames: u32) -> Self {
        self.static_timeout = Some(frames);
        self
    }
}

impl ResourceDef for FrameBufferDef {
    type Object = FrameBuffer;

    fn shape(&self) -> ResourceShape {
        ResourceShape::FrameBuffer(self.desc)
    }

    fn create(
        &self,
        backend: &mut dyn RenderBackend,
    ) -> Result<Option<FrameBuffer>, BackendError> {
        backend.create_frame_buffer(&self.desc).map(Some)
    }

    fn apply(&self, frame_buffer: &mut FrameBuffer) -> bool {
        frame_buffer.desc() == &self.desc
    }

    fn native_disposer(&self) -> Option<fn(FrameBuffer, &mut dyn RenderBackend)> {
        Some(FrameBuffer::dispose)
    }

    fn static_timeout(&self) -> Option<u32> {
        self.static_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_disposer_resolution_order() {
        let explicit = TextureDef::new(4, 4, wgpu::TextureFormat::Rgba8Unorm)
            .with_disposer(|texture, backend| backend.dispose_texture(&texture));
        assert_eq!(ErasedDef::disposal(&explicit).kind(), DisposerKind::Explicit);

        let native = TextureDef::new(4, 4, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(ErasedDef::disposal(&native).kind(), DisposerKind::Native);

        let plain = ValueDef::new(|| Some(7_u32));
        assert_eq!(ErasedDef::disposal(&plain).kind(), DisposerKind::Noop);
    }

    #[test]
    fn test_value_def_apply_requires_reset() {
        let plain = ValueDef::new(|| Some(vec![1_u8]));
        let mut value: Box<dyn Any> = Box::new(vec![1_u8]);
        assert!(!ErasedDef::apply(&plain, value.as_mut()));

        let resettable = plain.with_reset(|v| {
            v.clear();
            true
        });
        assert!(ErasedDef::apply(&resettable, value.as_mut()));
        assert_eq!(value.downcast_ref::<Vec<u8>>().unwrap().len(), 0);

        // Wrong object type is never applied.
        let mut other: Box<dyn Any> = Box::new(1_i32);
        assert!(!ErasedDef::apply(&resettable, other.as_mut()));
    }

    #[test]
    fn test_texture_def_creates_through_backend() {
        let mut backend = HeadlessBackend::new();
        let def = TextureDef::new(16, 8, wgpu::TextureFormat::Rgba8Unorm);
        let texture = ResourceDef::create(&def, &mut backend).unwrap().unwrap();
        assert_eq!(texture.size(), glam::UVec2::new(16, 8));
        assert_eq!(backend.live_textures(), 1);
    }
}
