use std::marker::PhantomData;
use std::ops::Range;

use bytemuck::Pod;

use super::error::BufferError;
use super::manager::BufferManager;
use super::object::{BufferHandle, BufferObject, MapState};

/// A scoped write view on one buffer.
///
/// Writes land in the manager's shadow copy and widen a dirty range. Ending the
/// mapping (through [`BufferManager::unmap`] or by dropping it) uploads that range
/// to the backend and marks the buffer unmapped again.
pub struct BufferMapping<'m> {
    manager: &'m BufferManager,
    object: &'m BufferObject,
    dirty: Option<Range<usize>>,
    finished: bool,
}

impl<'m> BufferMapping<'m> {
    pub(crate) fn new(manager: &'m BufferManager, object: &'m BufferObject) -> Self {
        Self { manager, object, dirty: None, finished: false }
    }

    pub fn handle(&self) -> BufferHandle {
        self.object.handle()
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.object.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `value` at byte `offset`. No alignment is required.
    pub fn write<T: Pod>(&mut self, offset: usize, value: &T) -> Result<(), BufferError> {
        self.write_bytes(offset, bytemuck::bytes_of(value))
    }

    pub fn write_slice<T: Pod>(&mut self, offset: usize, values: &[T]) -> Result<(), BufferError> {
        self.write_bytes(offset, bytemuck::cast_slice(values))
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        let range = self.checked_range(offset, bytes.len())?;
        self.object.data.borrow_mut()[range.clone()].copy_from_slice(bytes);
        self.mark_dirty(range);
        Ok(())
    }

    /// Reads a `T` from byte `offset` of the shadow copy.
    pub fn read<T: Pod>(&self, offset: usize) -> Result<T, BufferError> {
        let range = self.checked_range(offset, size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(&self.object.data.borrow()[range]))
    }

    /// Runs `f` over the whole mapped range and marks all of it dirty.
    pub fn with_bytes_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let len = self.len();
        let result = {
            let mut data = self.object.data.borrow_mut();
            f(data.as_mut_slice())
        };
        if len > 0 {
            self.mark_dirty(0..len);
        }
        result
    }

    /// Views the buffer as an array of `T`, starting at offset 0.
    pub fn pool<T: Pod>(&mut self) -> UniformPool<'_, 'm, T> {
        self.pool_at(0)
    }

    /// Views the buffer from byte `base` on as an array of `T`.
    ///
    /// Useful for a runtime-sized trailing array that follows a fixed header.
    pub fn pool_at<T: Pod>(&mut self, base: usize) -> UniformPool<'_, 'm, T> {
        UniformPool { mapping: self, base, _element: PhantomData }
    }

    pub(crate) fn finish(mut self) -> Result<(), BufferError> {
        self.commit()
    }

    fn checked_range(&self, offset: usize, len: usize) -> Result<Range<usize>, BufferError> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(offset..end),
            _ => Err(BufferError::OutOfBounds { handle: self.handle(), offset, len, size }),
        }
    }

    fn mark_dirty(&mut self, range: Range<usize>) {
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(range.start)..d.end.max(range.end),
            None => range,
        });
    }

    fn commit(&mut self) -> Result<(), BufferError> {
        self.finished = true;
        let result = match self.dirty.take() {
            Some(range) => {
                let data = self.object.data.borrow();
                // Backends copy in 4-byte units.
                let start = range.start / 4 * 4;
                let end = range.end.next_multiple_of(4).min(data.len());
                self.manager.backend().upload(self.handle(), start as u64, &data[start..end])
            }
            None => Ok(()),
        };
        self.object.state.set(MapState::Unmapped);
        result
    }
}

impl Drop for BufferMapping<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.commit() {
            log::error!("commit on drop failed: {e}");
        }
    }
}

/// Array-of-`T` view over a mapping; see [`BufferMapping::pool`].
pub struct UniformPool<'a, 'm, T> {
    mapping: &'a mut BufferMapping<'m>,
    base: usize,
    _element: PhantomData<T>,
}

impl<T: Pod> UniformPool<'_, '_, T> {
    /// Number of whole `T`s that fit after the base offset.
    pub fn capacity(&self) -> usize {
        self.mapping
            .len()
            .saturating_sub(self.base)
            .checked_div(size_of::<T>())
            .unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, value: &T) -> Result<(), BufferError> {
        let offset = self.offset_of(index)?;
        self.mapping.write(offset, value)
    }

    pub fn get(&self, index: usize) -> Result<T, BufferError> {
        let offset = self.offset_of(index)?;
        self.mapping.read(offset)
    }

    fn offset_of(&self, index: usize) -> Result<usize, BufferError> {
        if index >= self.capacity() {
            return Err(BufferError::OutOfBounds {
                handle: self.mapping.handle(),
                offset: self.base.saturating_add(index.saturating_mul(size_of::<T>())),
                len: size_of::<T>(),
                size: self.mapping.len(),
            });
        }
        Ok(self.base + index * size_of::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BindlessTextureHandle, BufferKind, HostBackend};

    #[repr(C)]
    #[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Mvp {
        model: [[f32; 4]; 4],
        view: [[f32; 4]; 4],
        projection: [[f32; 4]; 4],
    }

    const IDENTITY: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    fn sized(size: u64) -> (BufferManager, BufferHandle, HostBackend) {
        let backend = HostBackend::new();
        let mut mgr = BufferManager::new(backend.clone());
        let h = mgr.create(BufferKind::ShaderStorage);
        mgr.resize(h, size).unwrap();
        (mgr, h, backend)
    }

    // ── typed access ──────────────────────────────────────────────────────

    #[test]
    fn write_and_read_back() {
        let (mgr, h, _) = sized(32);
        let mut m = mgr.map(h).unwrap();
        m.write(16, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.read::<[f32; 4]>(16).unwrap(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.read::<f32>(0).unwrap(), 0.0);
    }

    #[test]
    fn unaligned_offsets_are_fine() {
        let (mgr, h, _) = sized(16);
        let mut m = mgr.map(h).unwrap();
        m.write(3, &0xdead_beefu32).unwrap();
        assert_eq!(m.read::<u32>(3).unwrap(), 0xdead_beef);
    }

    #[test]
    fn out_of_bounds() {
        let (mgr, h, _) = sized(8);
        let mut m = mgr.map(h).unwrap();
        assert_eq!(
            m.write(4, &[0u32; 2]),
            Err(BufferError::OutOfBounds { handle: h, offset: 4, len: 8, size: 8 })
        );
        assert!(m.read::<u64>(usize::MAX).is_err());
    }

    #[test]
    fn bindless_handles_are_u64_slots() {
        let (mgr, h, backend) = sized(16);
        let mut m = mgr.map(h).unwrap();
        m.write_slice(0, &[BindlessTextureHandle(7), BindlessTextureHandle(9)]).unwrap();
        mgr.unmap(m).unwrap();

        let committed = backend.committed(h).unwrap();
        assert_eq!(&committed[8..16], &9u64.to_ne_bytes());
    }

    #[test]
    fn with_bytes_mut_marks_everything_dirty() {
        let (mgr, h, backend) = sized(8);
        let mut m = mgr.map(h).unwrap();
        m.with_bytes_mut(|bytes| bytes.fill(0xff));
        mgr.unmap(m).unwrap();
        assert_eq!(backend.committed(h), Some(vec![0xff; 8]));
    }

    // ── dirty range ───────────────────────────────────────────────────────

    #[test]
    fn commit_widens_to_four_bytes() {
        let (mgr, h, backend) = sized(12);
        let mut m = mgr.map(h).unwrap();
        m.write(5, &1u8).unwrap();
        mgr.unmap(m).unwrap();

        let committed = backend.committed(h).unwrap();
        assert_eq!(committed[5], 1);
        assert_eq!(backend.upload_count(), 1);
    }

    #[test]
    fn writes_merge_into_one_upload() {
        let (mgr, h, backend) = sized(64);
        let mut m = mgr.map(h).unwrap();
        m.write(0, &1u32).unwrap();
        m.write(60, &2u32).unwrap();
        mgr.unmap(m).unwrap();
        assert_eq!(backend.upload_count(), 1);
        assert_eq!(mgr.get(h).unwrap().contents(), backend.committed(h).unwrap());
    }

    // ── pools ─────────────────────────────────────────────────────────────

    #[test]
    fn pool_of_mvp_structs() {
        let (mgr, h, _) = sized(192 * 4);
        let mut m = mgr.map(h).unwrap();
        let mut pool = m.pool::<Mvp>();
        assert_eq!(pool.capacity(), 4);

        let mvp = Mvp { model: IDENTITY, view: IDENTITY, projection: IDENTITY };
        pool.set(3, &mvp).unwrap();
        assert_eq!(pool.get(3).unwrap(), mvp);
        assert!(matches!(pool.set(4, &mvp), Err(BufferError::OutOfBounds { .. })));
    }

    #[test]
    fn pool_at_skips_a_header() {
        let (mgr, h, _) = sized(16 + 3 * 64);
        let mut m = mgr.map(h).unwrap();
        {
            let mut items = m.pool_at::<[[f32; 4]; 4]>(16);
            assert_eq!(items.capacity(), 3);
            items.set(0, &IDENTITY).unwrap();
        }
        assert_eq!(m.read::<f32>(16).unwrap(), 1.0);
    }

    #[test]
    fn zero_sized_pool_is_empty() {
        let (mgr, h, _) = sized(16);
        let mut m = mgr.map(h).unwrap();
        assert_eq!(m.pool::<()>().capacity(), 0);
    }
}
