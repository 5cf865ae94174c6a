use std::cell::{Cell, RefCell};
use std::fmt;

/// What a buffer is bound as.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferKind {
    /// Uniform buffer object, std140 layout.
    Uniform,
    /// Shader storage buffer object, std430 layout.
    ShaderStorage,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BufferKind::Uniform => "uniform",
            BufferKind::ShaderStorage => "shader storage",
        })
    }
}

/// Identifies a buffer inside its [`BufferManager`](super::BufferManager).
///
/// Handles are never reused, so a stale handle fails lookups instead of
/// aliasing a newer buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BufferHandle(pub(crate) u32);

impl BufferHandle {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapState {
    Unmapped,
    MappedForWrite,
}

/// A 64-bit bindless texture handle as stored in a `tz_bindless_sampler` field.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BindlessTextureHandle(pub u64);

/// One buffer and its host-side shadow copy.
///
/// Contents live behind a `RefCell` so a mapping can write through a shared
/// borrow of the manager; that is what lets several handles be mapped at once.
#[derive(Debug)]
pub struct BufferObject {
    handle: BufferHandle,
    kind: BufferKind,
    pub(crate) data: RefCell<Vec<u8>>,
    pub(crate) state: Cell<MapState>,
    pub(crate) min_size: u64,
    pub(crate) terminal: bool,
}

impl BufferObject {
    pub(crate) fn new(handle: BufferHandle, kind: BufferKind) -> Self {
        Self {
            handle,
            kind,
            data: RefCell::new(Vec::new()),
            state: Cell::new(MapState::Unmapped),
            min_size: 0,
            terminal: false,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Current size in bytes.
    pub fn size(&self) -> u64 {
        self.data.borrow().len() as u64
    }

    /// Size of the block layout this buffer was created for; 0 if none.
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    pub fn is_undersized(&self) -> bool {
        self.size() < self.min_size
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn map_state(&self) -> MapState {
        self.state.get()
    }

    pub fn is_mapped(&self) -> bool {
        self.state.get() == MapState::MappedForWrite
    }

    /// Copy of the shadow contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }
}
