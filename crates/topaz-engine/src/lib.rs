//! Topaz engine crate.
//!
//! This crate owns the shader pipeline: buffer objects, the directive
//! preprocessor, program building, and the render-device binding state that
//! consumes them. Source-level parsing lives in `topaz-glsl`.

pub mod buffer;
pub mod device;
pub mod render;
pub mod shader;

pub mod logging;
