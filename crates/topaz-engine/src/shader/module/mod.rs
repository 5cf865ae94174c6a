//! Preprocessor modules.
//!
//! The set of modules is closed: two block flavours and the bindless-sampler
//! rewrite. Consumers reach a module's registrations by matching on [`Module`]
//! or through [`Module::as_block`].

mod bindless;
mod block;

pub use bindless::{BindlessSamplerConfig, BindlessSamplerModule, BINDLESS_SAMPLER_TYPE};
pub use block::{BlockModule, BlockModuleConfig, Registration};

use crate::buffer::{BufferKind, BufferManager};

use super::error::PreprocessError;

#[derive(Debug, Clone)]
pub enum Module {
    /// `#ssbo` blocks, std430.
    Ssbo(BlockModule),
    /// `#ubo` blocks, std140.
    Ubo(BlockModule),
    BindlessSampler(BindlessSamplerModule),
}

impl Module {
    pub fn ssbo() -> Self {
        Module::Ssbo(BlockModule::ssbo())
    }

    pub fn ubo() -> Self {
        Module::Ubo(BlockModule::ubo())
    }

    pub fn bindless_sampler() -> Self {
        Module::BindlessSampler(BindlessSamplerModule::default())
    }

    pub fn as_block(&self) -> Option<&BlockModule> {
        match self {
            Module::Ssbo(m) | Module::Ubo(m) => Some(m),
            Module::BindlessSampler(_) => None,
        }
    }

    pub fn as_bindless_sampler(&self) -> Option<&BindlessSamplerModule> {
        match self {
            Module::BindlessSampler(m) => Some(m),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Module::Ssbo(_) => "ssbo",
            Module::Ubo(_) => "ubo",
            Module::BindlessSampler(_) => "bindless_sampler",
        }
    }

    pub(crate) fn apply(&mut self, source: &mut String, buffers: &mut BufferManager) -> Result<(), PreprocessError> {
        match self {
            Module::Ssbo(m) | Module::Ubo(m) => m.apply(source, buffers),
            Module::BindlessSampler(m) => {
                m.apply(source);
                Ok(())
            }
        }
    }

    /// Destroys buffers this module registered after `earlier` was cloned from it.
    pub(crate) fn discard_since(&mut self, earlier: &Module, buffers: &mut BufferManager) {
        if let (Some(now), Some(before)) = (self.as_block_mut(), earlier.as_block()) {
            now.truncate(before.size(), buffers);
        }
    }

    fn as_block_mut(&mut self) -> Option<&mut BlockModule> {
        match self {
            Module::Ssbo(m) | Module::Ubo(m) => Some(m),
            Module::BindlessSampler(_) => None,
        }
    }
}

impl From<BlockModule> for Module {
    fn from(m: BlockModule) -> Self {
        match m.kind() {
            BufferKind::ShaderStorage => Module::Ssbo(m),
            BufferKind::Uniform => Module::Ubo(m),
        }
    }
}

impl From<BindlessSamplerModule> for Module {
    fn from(m: BindlessSamplerModule) -> Self {
        Module::BindlessSampler(m)
    }
}
