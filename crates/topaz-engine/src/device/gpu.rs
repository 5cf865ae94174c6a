use anyhow::{Context, Result};

use crate::buffer::WgpuBufferBackend;

/// Initialization parameters for the GPU layer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub power_preference: wgpu::PowerPreference,

    /// Accept a software adapter (e.g. llvmpipe, WARP) when no hardware one exists.
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

/// Owns the wgpu core objects for headless work.
///
/// Windowing and presentation are the caller's business; this type only
/// provides the device and queue that buffers and pipelines are created on.
pub struct Gpu {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl Gpu {
    /// Requests an adapter and device.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; callers without an
    /// executor can drive it with `pollster::block_on`.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: init.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("topaz-engine device"),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        Ok(Gpu { adapter, device, queue })
    }

    /// Blocking variant of [`Gpu::new`].
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// A buffer backend that allocates on this device.
    pub fn buffer_backend(&self) -> WgpuBufferBackend {
        WgpuBufferBackend::new(self.device.clone(), self.queue.clone())
    }
}
