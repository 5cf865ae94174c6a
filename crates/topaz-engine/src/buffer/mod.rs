//! Buffer objects backing `#ssbo` / `#ubo` blocks.
//!
//! The [`BufferManager`] owns every buffer and keeps a host-side shadow copy of
//! its contents. Writes go through a scoped [`BufferMapping`]; the dirty range is
//! pushed to a [`BufferBackend`] when the mapping ends. Binding buffers to a
//! pipeline is not this module's job (see `render`).

mod backend;
mod error;
mod gpu;
mod manager;
mod mapping;
mod object;

pub use backend::{BufferBackend, HostBackend, DEFAULT_HOST_BUFFER_LIMIT};
pub use error::BufferError;
pub use gpu::WgpuBufferBackend;
pub use manager::{BufferManager, ManagerId};
pub use mapping::{BufferMapping, UniformPool};
pub use object::{BindlessTextureHandle, BufferHandle, BufferKind, BufferObject, MapState};
