use std::collections::HashMap;

use topaz_glsl::{
    block_layout, collect_declarations, parse_directives, tokenize, BlockDirective, BlockLayout, Declarations,
    LayoutRules,
};

use crate::buffer::{BufferHandle, BufferKind, BufferManager, ManagerId};
use crate::shader::error::PreprocessError;

/// Binding assignment for a [`BlockModule`].
///
/// A block's binding index is `binding_base` plus its registration ordinal.
/// Uniform and storage blocks share one binding namespace in wgpu, so give
/// the two modules disjoint ranges when both are used on one program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockModuleConfig {
    pub binding_base: u32,
}

/// One block this module has turned into a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub handle: BufferHandle,
    pub binding: u32,
    pub layout: BlockLayout,
}

/// Expands `#ssbo` or `#ubo` directives.
///
/// Registrations accumulate across passes: a block name seen by an earlier
/// pass (say the vertex stage) resolves to the same buffer and binding when a
/// later stage declares it again.
#[derive(Debug, Clone)]
pub struct BlockModule {
    kind: BufferKind,
    config: BlockModuleConfig,
    manager: Option<ManagerId>,
    registrations: Vec<Registration>,
}

/// A directive that passed validation, waiting to be registered.
struct Planned<'d> {
    directive: &'d BlockDirective,
    layout: BlockLayout,
    existing: Option<usize>,
}

impl BlockModule {
    pub fn new(kind: BufferKind, config: BlockModuleConfig) -> Self {
        Self { kind, config, manager: None, registrations: Vec::new() }
    }

    /// `#ssbo` module with bindings starting at 0.
    pub fn ssbo() -> Self {
        Self::new(BufferKind::ShaderStorage, BlockModuleConfig::default())
    }

    /// `#ubo` module with bindings starting at 0.
    pub fn ubo() -> Self {
        Self::new(BufferKind::Uniform, BlockModuleConfig::default())
    }

    pub fn with_binding_base(mut self, binding_base: u32) -> Self {
        self.config.binding_base = binding_base;
        self
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// The directive word, without `#`.
    pub fn marker(&self) -> &'static str {
        match self.kind {
            BufferKind::ShaderStorage => "ssbo",
            BufferKind::Uniform => "ubo",
        }
    }

    pub fn rules(&self) -> LayoutRules {
        match self.kind {
            BufferKind::ShaderStorage => LayoutRules::Std430,
            BufferKind::Uniform => LayoutRules::Std140,
        }
    }

    fn storage_qualifier(&self) -> &'static str {
        match self.kind {
            BufferKind::ShaderStorage => "buffer",
            BufferKind::Uniform => "uniform",
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Number of registered blocks.
    pub fn size(&self) -> usize {
        self.registrations.len()
    }

    pub fn get_name(&self, index: usize) -> Option<&str> {
        self.registrations.get(index).map(|r| r.name.as_str())
    }

    pub fn get_buffer_id(&self, index: usize) -> Option<BufferHandle> {
        self.registrations.get(index).map(|r| r.handle)
    }

    /// The `binding = N` written for the block at `index`.
    pub fn binding_index(&self, index: usize) -> Option<u32> {
        self.registrations.get(index).map(|r| r.binding)
    }

    pub fn layout(&self, index: usize) -> Option<&BlockLayout> {
        self.registrations.get(index).map(|r| &r.layout)
    }

    pub fn find(&self, name: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.name == name)
    }

    /// Registrations in declaration order.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    // ── Pass ──────────────────────────────────────────────────────────────

    /// Expands every directive in `source`, creating buffers for new blocks.
    ///
    /// All directives are validated before anything is created, so on error
    /// `source`, `buffers`, and this module are left as they were.
    pub fn apply(&mut self, source: &mut String, buffers: &mut BufferManager) -> Result<(), PreprocessError> {
        let tokens = tokenize(source);
        let directives = parse_directives(&tokens, self.marker())?;
        if directives.is_empty() {
            return Ok(());
        }
        if let Some(expected) = self.manager
            && expected != buffers.id()
        {
            return Err(PreprocessError::ForeignManager { expected, actual: buffers.id() });
        }

        let decls = collect_declarations(&tokens);
        let planned = self.validate(&directives, &decls, buffers)?;

        let first_new = self.registrations.len();
        let bindings = match self.register(&planned, buffers) {
            Ok(bindings) => bindings,
            Err(e) => {
                self.truncate(first_new, buffers);
                return Err(e);
            }
        };
        self.manager = Some(buffers.id());

        // Back to front so earlier spans stay valid.
        for (directive, binding) in directives.iter().zip(bindings).rev() {
            if !directive.terminated {
                source.insert(directive.body_end, ';');
            }
            let header = format!(
                "layout({}, binding = {binding}) {}",
                self.rules().qualifier(),
                self.storage_qualifier()
            );
            source.replace_range(directive.marker.clone(), &header);
        }

        log::debug!(
            "#{} pass expanded {} block(s), {} registered",
            self.marker(),
            directives.len(),
            self.registrations.len()
        );
        Ok(())
    }

    fn validate<'d>(
        &self,
        directives: &'d [BlockDirective],
        decls: &Declarations,
        buffers: &BufferManager,
    ) -> Result<Vec<Planned<'d>>, PreprocessError> {
        let mut seen = HashMap::new();
        let mut planned = Vec::with_capacity(directives.len());

        for directive in directives {
            if seen.insert(directive.name.as_str(), directive.line).is_some() {
                return Err(PreprocessError::DuplicateBlockName {
                    name: directive.name.clone(),
                    line: directive.line,
                });
            }

            let layout = block_layout(&directive.fields, self.rules(), decls).map_err(|source| {
                PreprocessError::Layout { block: directive.name.clone(), source }
            })?;

            let existing = self.registrations.iter().position(|r| r.name == directive.name);
            if let Some(i) = existing {
                let registered = &self.registrations[i];
                if registered.layout != layout {
                    return Err(PreprocessError::ConflictingBlockLayout {
                        name: directive.name.clone(),
                        registered_size: registered.layout.size,
                        size: layout.size,
                    });
                }
                buffers.get(registered.handle)?;
            }

            planned.push(Planned { directive, layout, existing });
        }
        Ok(planned)
    }

    fn register(&mut self, planned: &[Planned<'_>], buffers: &mut BufferManager) -> Result<Vec<u32>, PreprocessError> {
        let mut bindings = Vec::with_capacity(planned.len());
        for plan in planned {
            if let Some(i) = plan.existing {
                bindings.push(self.registrations[i].binding);
                continue;
            }

            let binding = u32::try_from(self.registrations.len())
                .ok()
                .and_then(|ordinal| self.config.binding_base.checked_add(ordinal))
                .ok_or_else(|| PreprocessError::BindingOverflow {
                    name: plan.directive.name.clone(),
                    binding_base: self.config.binding_base,
                })?;
            let handle = buffers.create(self.kind);
            let size = plan.layout.size;
            self.registrations.push(Registration {
                name: plan.directive.name.clone(),
                handle,
                binding,
                layout: plan.layout.clone(),
            });
            buffers.resize(handle, size)?;
            buffers.declare_min_size(handle, size)?;

            log::debug!(
                "registered {} block '{}' -> {handle}, binding {binding}, {size} bytes",
                self.kind,
                plan.directive.name
            );
            bindings.push(binding);
        }
        Ok(bindings)
    }

    /// Drops registrations from `len` on and destroys their buffers.
    pub(crate) fn truncate(&mut self, len: usize, buffers: &mut BufferManager) {
        if len >= self.registrations.len() {
            return;
        }
        for r in self.registrations.drain(len..) {
            if let Err(e) = buffers.destroy(r.handle) {
                log::warn!("rolling back block '{}': {e}", r.name);
            }
        }
    }
}
