use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::backend::{check_size, BufferBackend};
use super::error::BufferError;
use super::object::{BufferHandle, BufferKind};

/// Backend that keeps one `wgpu::Buffer` per handle.
///
/// Created by [`Gpu::buffer_backend`](crate::device::Gpu::buffer_backend). Clones
/// share the buffer table, so the renderer can look up the `wgpu::Buffer` behind a
/// handle while the manager owns the backend.
#[derive(Clone)]
pub struct WgpuBufferBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_buffer_size: u64,
    buffers: Rc<RefCell<HashMap<BufferHandle, wgpu::Buffer>>>,
}

impl WgpuBufferBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let max_buffer_size = device.limits().max_buffer_size;
        Self { device, queue, max_buffer_size, buffers: Rc::default() }
    }

    /// The GPU buffer behind `handle`. `None` until the handle has a non-zero size.
    pub fn buffer(&self, handle: BufferHandle) -> Option<wgpu::Buffer> {
        self.buffers.borrow().get(&handle).cloned()
    }

    fn usage(kind: BufferKind) -> wgpu::BufferUsages {
        match kind {
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            BufferKind::ShaderStorage => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
            }
        }
    }
}

impl BufferBackend for WgpuBufferBackend {
    fn allocate(&mut self, handle: BufferHandle, kind: BufferKind, size: u64) -> Result<(), BufferError> {
        let padded = size.checked_next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT).unwrap_or(u64::MAX);
        check_size(handle, padded, self.max_buffer_size)?;

        let mut buffers = self.buffers.borrow_mut();
        if let Some(old) = buffers.remove(&handle) {
            old.destroy();
        }
        if size == 0 {
            return Ok(());
        }

        let label = format!("topaz {kind} {handle}");
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size: padded,
            usage: Self::usage(kind),
            mapped_at_creation: false,
        });
        log::debug!("allocated {label} ({padded} bytes)");
        buffers.insert(handle, buffer);
        Ok(())
    }

    fn upload(&self, handle: BufferHandle, offset: u64, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let buffers = self.buffers.borrow();
        let buffer = buffers
            .get(&handle)
            .ok_or_else(|| BufferError::Backend { handle, message: "no GPU buffer allocated".into() })?;

        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BufferError::Backend {
                handle,
                message: format!("upload offset {offset} is not 4-byte aligned"),
            });
        }
        let end = offset + bytes.len() as u64;
        if end > buffer.size() {
            return Err(BufferError::Backend {
                handle,
                message: format!("upload of {offset}..{end} exceeds {} bytes", buffer.size()),
            });
        }

        // write_buffer wants a 4-byte multiple; only the tail of a buffer can be short.
        if bytes.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(buffer, offset, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(bytes.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            self.queue.write_buffer(buffer, offset, &padded);
        }
        Ok(())
    }

    fn release(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.buffers.borrow_mut().remove(&handle) {
            buffer.destroy();
        }
    }

    fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }
}
