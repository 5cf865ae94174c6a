//! Render-device binding state.
//!
//! The device holds the bound program and buffer bindings explicitly; there is
//! no global GL-style context. Draws are validated against the buffer manager
//! and recorded as [`DrawCommand`]s for a backend to replay.

mod device;
mod error;

pub use device::{BufferBinding, DrawCommand, DrawParams, Primitive, RenderDevice};
pub use error::RenderError;
