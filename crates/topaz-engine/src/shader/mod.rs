//! Shader source preprocessing and program building.
//!
//! A [`ShaderPreprocessor`] runs its [`Module`]s over a GLSL source in order.
//! Block modules turn `#ssbo` / `#ubo` directives into bound interface blocks
//! and allocate their buffers; the bindless-sampler module rewrites
//! `tz_bindless_sampler` into a real sampler type. The rewritten stages go
//! through a [`ProgramBuilder`] to become a [`Program`].

mod compiler;
mod error;
pub mod module;
mod preprocessor;
mod program;

pub use compiler::{NagaCompiler, NagaUnit, ShaderCompiler, ShaderStage};
pub use error::PreprocessError;
pub use module::{
    BindlessSamplerConfig, BindlessSamplerModule, BlockModule, BlockModuleConfig, Module, Registration,
};
pub use preprocessor::ShaderPreprocessor;
pub use program::{Diagnostic, Program, ProgramBuilder, ProgramId, ProgramState, StageRecord};
