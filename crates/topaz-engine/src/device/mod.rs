//! GPU device management.
//!
//! This module is responsible for creating the wgpu Instance/Adapter/Device/Queue
//! without a surface, and for handing out the buffer backend that commits
//! mapped buffer contents to that device.

mod gpu;

pub use gpu::{Gpu, GpuInit};
