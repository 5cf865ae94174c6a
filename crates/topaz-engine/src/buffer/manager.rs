use std::sync::atomic::{AtomicU64, Ordering};

use super::backend::{check_size, BufferBackend, HostBackend};
use super::error::BufferError;
use super::mapping::BufferMapping;
use super::object::{BufferHandle, BufferKind, BufferObject, MapState};

/// Identity of a [`BufferManager`], used to catch handles passed to the wrong manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ManagerId(u64);

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Owns every buffer object and the backend they commit to.
///
/// Slots are indexed by handle. A destroyed buffer leaves an empty slot behind
/// so its handle is never issued again.
pub struct BufferManager {
    id: ManagerId,
    slots: Vec<Option<BufferObject>>,
    backend: Box<dyn BufferBackend>,
}

impl BufferManager {
    pub fn new(backend: impl BufferBackend + 'static) -> Self {
        Self {
            id: ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed)),
            slots: Vec::new(),
            backend: Box::new(backend),
        }
    }

    /// A manager backed by a fresh [`HostBackend`].
    pub fn host() -> Self {
        Self::new(HostBackend::new())
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Creates an empty buffer of `kind`.
    pub fn create(&mut self, kind: BufferKind) -> BufferHandle {
        let handle = BufferHandle(self.slots.len() as u32);
        self.slots.push(Some(BufferObject::new(handle, kind)));
        log::debug!("created {kind} {handle}");
        handle
    }

    /// Reallocates `handle` to exactly `size` bytes. Previous contents are discarded.
    ///
    /// Sizes above the backend's [`max_buffer_size`](BufferBackend::max_buffer_size)
    /// fail with [`BufferError::Backend`] before anything is allocated.
    pub fn resize(&mut self, handle: BufferHandle, size: u64) -> Result<(), BufferError> {
        let limit = self.backend.max_buffer_size();
        let object = self.slot_mut(handle)?;
        if object.terminal {
            return Err(BufferError::TerminalBuffer(handle));
        }
        let kind = object.kind();
        let len = check_size(handle, size, limit)?;
        self.backend.allocate(handle, kind, size)?;

        // Only touch the shadow once the backend agreed to the new size.
        let object = self.slot_mut(handle)?;
        *object.data.get_mut() = vec![0; len];
        log::debug!("resized {handle} to {size} bytes");
        Ok(())
    }

    /// Resizes `handle` for the last time; later resizes fail with
    /// [`BufferError::TerminalBuffer`].
    pub fn terminal_resize(&mut self, handle: BufferHandle, size: u64) -> Result<(), BufferError> {
        self.resize(handle, size)?;
        self.slot_mut(handle)?.terminal = true;
        Ok(())
    }

    /// Opens a write view on `handle`.
    ///
    /// Fails with [`BufferError::AlreadyMapped`] if another mapping of the same
    /// handle is alive, and with [`BufferError::Undersized`] if the buffer is smaller
    /// than the block layout it was created for.
    pub fn map(&self, handle: BufferHandle) -> Result<BufferMapping<'_>, BufferError> {
        let object = self.get(handle)?;
        if object.is_mapped() {
            return Err(BufferError::AlreadyMapped(handle));
        }
        if object.is_undersized() {
            return Err(BufferError::Undersized {
                handle,
                size: object.size(),
                required: object.min_size,
            });
        }
        object.state.set(MapState::MappedForWrite);
        Ok(BufferMapping::new(self, object))
    }

    /// Ends `mapping` and commits what it wrote.
    ///
    /// Dropping a mapping commits as well, but only `unmap` reports backend failures.
    pub fn unmap(&self, mapping: BufferMapping<'_>) -> Result<(), BufferError> {
        mapping.finish()
    }

    pub fn get(&self, handle: BufferHandle) -> Result<&BufferObject, BufferError> {
        self.slots
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BufferError::InvalidHandle(handle))
    }

    /// Like [`get`](Self::get), but also checks the buffer kind.
    pub fn get_kind(&self, handle: BufferHandle, kind: BufferKind) -> Result<&BufferObject, BufferError> {
        let object = self.get(handle)?;
        if object.kind() != kind {
            return Err(BufferError::KindMismatch { handle, expected: kind, actual: object.kind() });
        }
        Ok(object)
    }

    /// Releases `handle`. The handle stays invalid for the manager's lifetime.
    pub fn destroy(&mut self, handle: BufferHandle) -> Result<(), BufferError> {
        let slot = self
            .slots
            .get_mut(handle.0 as usize)
            .filter(|slot| slot.is_some())
            .ok_or(BufferError::InvalidHandle(handle))?;
        *slot = None;
        self.backend.release(handle);
        log::debug!("destroyed {handle}");
        Ok(())
    }

    /// Number of live buffers.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handles in creation order.
    pub fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.slots.iter().flatten().map(BufferObject::handle)
    }

    /// Records the layout size `handle` must hold before it can be mapped.
    pub(crate) fn declare_min_size(&mut self, handle: BufferHandle, size: u64) -> Result<(), BufferError> {
        self.slot_mut(handle)?.min_size = size;
        Ok(())
    }

    pub(crate) fn backend(&self) -> &dyn BufferBackend {
        self.backend.as_ref()
    }

    fn slot_mut(&mut self, handle: BufferHandle) -> Result<&mut BufferObject, BufferError> {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(BufferError::InvalidHandle(handle))
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        for handle in self.slots.iter().flatten().map(BufferObject::handle) {
            self.backend.release(handle);
        }
    }
}
