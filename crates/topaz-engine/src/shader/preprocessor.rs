use std::ops::Index;

use crate::buffer::BufferManager;

use super::error::PreprocessError;
use super::module::Module;

/// Runs a fixed list of modules over one shader source.
///
/// Modules keep their registrations across [`set_source`](Self::set_source), so
/// one preprocessor can walk every stage of a program and stages that declare
/// the same block share its buffer.
#[derive(Debug, Default)]
pub struct ShaderPreprocessor {
    source: String,
    modules: Vec<Module>,
}

impl ShaderPreprocessor {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), modules: Vec::new() }
    }

    /// Replaces the source; modules and their registrations stay.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Appends a module and returns its index. Modules run in insertion order.
    pub fn emplace_module(&mut self, module: impl Into<Module>) -> usize {
        self.modules.push(module.into());
        self.modules.len() - 1
    }

    pub fn module(&self, index: usize) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Runs every module over the source.
    ///
    /// The pass works on copies of the source and modules; nothing is kept unless
    /// every module succeeds, and buffers created by modules that ran before the
    /// failing one are destroyed again.
    pub fn preprocess(&mut self, buffers: &mut BufferManager) -> Result<(), PreprocessError> {
        let mut working = self.source.clone();
        let mut modules = self.modules.clone();

        for i in 0..modules.len() {
            if let Err(e) = modules[i].apply(&mut working, buffers) {
                for (module, earlier) in modules[..i].iter_mut().zip(&self.modules) {
                    module.discard_since(earlier, buffers);
                }
                log::warn!("preprocessing failed in module {i} ({}): {e}", modules[i].name());
                return Err(e);
            }
        }

        self.source = working;
        self.modules = modules;
        Ok(())
    }

    /// The current source; after a successful [`preprocess`](Self::preprocess), the rewritten text.
    pub fn result(&self) -> &str {
        &self.source
    }

    pub fn into_result(self) -> String {
        self.source
    }
}

impl Index<usize> for ShaderPreprocessor {
    type Output = Module;

    fn index(&self, index: usize) -> &Module {
        &self.modules[index]
    }
}
