use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::BufferError;
use super::object::{BufferHandle, BufferKind};

/// Where committed buffer contents end up.
///
/// The manager calls `allocate` on every (re)size, `upload` when a mapping ends
/// with a dirty range, and `release` on destroy. Uploads happen through `&self`
/// because mappings only borrow the manager immutably.
pub trait BufferBackend {
    /// (Re)creates storage of `size` bytes, discarding previous contents.
    fn allocate(&mut self, handle: BufferHandle, kind: BufferKind, size: u64) -> Result<(), BufferError>;

    /// Writes `bytes` at `offset`. `offset` is a multiple of 4.
    fn upload(&self, handle: BufferHandle, offset: u64, bytes: &[u8]) -> Result<(), BufferError>;

    fn release(&mut self, handle: BufferHandle);

    /// Largest size `allocate` accepts, in bytes.
    fn max_buffer_size(&self) -> u64;
}

/// Rejects `size` if it exceeds `limit` or cannot be addressed on this target.
pub(crate) fn check_size(handle: BufferHandle, size: u64, limit: u64) -> Result<usize, BufferError> {
    if size > limit {
        return Err(BufferError::Backend {
            handle,
            message: format!("{size} bytes exceeds the {limit}-byte buffer limit"),
        });
    }
    usize::try_from(size).map_err(|_| BufferError::Backend {
        handle,
        message: format!("{size} bytes is not addressable on this target"),
    })
}

// ── HostBackend ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct HostBuffer {
    kind: BufferKind,
    bytes: Vec<u8>,
}

/// Host buffer cap when none is given; the same as wgpu's default `max_buffer_size`.
pub const DEFAULT_HOST_BUFFER_LIMIT: u64 = 256 << 20;

#[derive(Debug)]
struct HostState {
    buffers: HashMap<BufferHandle, HostBuffer>,
    uploads: usize,
    fail_uploads: bool,
    max_buffer_size: u64,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            buffers: HashMap::new(),
            uploads: 0,
            fail_uploads: false,
            max_buffer_size: DEFAULT_HOST_BUFFER_LIMIT,
        }
    }
}

/// In-memory backend.
///
/// Clones share state, so a test (or a headless run) can keep one clone and
/// inspect what the manager committed.
#[derive(Debug, Clone, Default)]
pub struct HostBackend {
    state: Rc<RefCell<HostState>>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend refusing buffers larger than `max_buffer_size` bytes.
    pub fn with_limit(max_buffer_size: u64) -> Self {
        let backend = Self::new();
        backend.state.borrow_mut().max_buffer_size = max_buffer_size;
        backend
    }

    /// Committed contents of `handle`, if it has storage.
    pub fn committed(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&handle).map(|b| b.bytes.clone())
    }

    pub fn kind_of(&self, handle: BufferHandle) -> Option<BufferKind> {
        self.state.borrow().buffers.get(&handle).map(|b| b.kind)
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.state.borrow().uploads
    }

    /// Number of buffers with live storage.
    pub fn live(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    #[cfg(test)]
    pub(crate) fn fail_uploads(&self, fail: bool) {
        self.state.borrow_mut().fail_uploads = fail;
    }
}

impl BufferBackend for HostBackend {
    fn allocate(&mut self, handle: BufferHandle, kind: BufferKind, size: u64) -> Result<(), BufferError> {
        let len = check_size(handle, size, self.max_buffer_size())?;
        self.state.borrow_mut().buffers.insert(handle, HostBuffer { kind, bytes: vec![0; len] });
        Ok(())
    }

    fn upload(&self, handle: BufferHandle, offset: u64, bytes: &[u8]) -> Result<(), BufferError> {
        let mut state = self.state.borrow_mut();
        if state.fail_uploads {
            return Err(BufferError::Backend { handle, message: "uploads disabled".into() });
        }
        let buffer = state
            .buffers
            .get_mut(&handle)
            .ok_or_else(|| BufferError::Backend { handle, message: "no storage allocated".into() })?;

        let start = offset as usize;
        let end = start + bytes.len();
        if end > buffer.bytes.len() {
            return Err(BufferError::Backend {
                handle,
                message: format!("upload of {}..{end} exceeds {} bytes", start, buffer.bytes.len()),
            });
        }
        buffer.bytes[start..end].copy_from_slice(bytes);
        state.uploads += 1;
        Ok(())
    }

    fn release(&mut self, handle: BufferHandle) {
        self.state.borrow_mut().buffers.remove(&handle);
    }

    fn max_buffer_size(&self) -> u64 {
        self.state.borrow().max_buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let mut backend = HostBackend::new();
        let probe = backend.clone();
        let h = BufferHandle(0);

        backend.allocate(h, BufferKind::Uniform, 8).unwrap();
        backend.upload(h, 4, &[1, 2, 3, 4]).unwrap();

        assert_eq!(probe.committed(h), Some(vec![0, 0, 0, 0, 1, 2, 3, 4]));
        assert_eq!(probe.kind_of(h), Some(BufferKind::Uniform));
        assert_eq!(probe.upload_count(), 1);
    }

    #[test]
    fn upload_past_the_end_fails() {
        let mut backend = HostBackend::new();
        let h = BufferHandle(3);
        backend.allocate(h, BufferKind::ShaderStorage, 4).unwrap();
        assert!(matches!(backend.upload(h, 4, &[0]), Err(BufferError::Backend { .. })));
    }

    #[test]
    fn upload_without_storage_fails() {
        let backend = HostBackend::new();
        assert!(backend.upload(BufferHandle(0), 0, &[0; 4]).is_err());
    }

    #[test]
    fn allocation_over_the_limit_fails() {
        let mut backend = HostBackend::with_limit(64);
        let h = BufferHandle(2);
        backend.allocate(h, BufferKind::ShaderStorage, 64).unwrap();
        assert!(matches!(
            backend.allocate(h, BufferKind::ShaderStorage, 65),
            Err(BufferError::Backend { handle, .. }) if handle == h
        ));
        assert_eq!(backend.committed(h).map(|b| b.len()), Some(64));
    }

    #[test]
    fn default_limit_matches_wgpu() {
        assert_eq!(HostBackend::new().max_buffer_size(), DEFAULT_HOST_BUFFER_LIMIT);
    }

    #[test]
    fn release_drops_storage() {
        let mut backend = HostBackend::new();
        let h = BufferHandle(1);
        backend.allocate(h, BufferKind::ShaderStorage, 16).unwrap();
        assert_eq!(backend.live(), 1);
        backend.release(h);
        assert_eq!(backend.live(), 0);
        assert!(backend.committed(h).is_none());
    }
}
