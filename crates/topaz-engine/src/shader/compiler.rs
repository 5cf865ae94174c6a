use std::collections::HashMap;
use std::fmt;

use wgpu::naga;

/// Pipeline stage a shader source is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tessellation control",
            ShaderStage::TessellationEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }

    /// Everything but compute.
    pub fn is_graphics(self) -> bool {
        self != ShaderStage::Compute
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The native compiler behind a [`ProgramBuilder`](super::ProgramBuilder).
///
/// Errors are the compiler's own log text; the builder wraps them into
/// [`Diagnostic`](super::Diagnostic)s.
pub trait ShaderCompiler {
    type Unit;

    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Unit, String>;

    /// Cross-stage checks on a set of units that already passed the builder's own rules.
    fn link(&mut self, units: &[(ShaderStage, &Self::Unit)]) -> Result<(), String>;
}

// ── NagaCompiler ──────────────────────────────────────────────────────────

/// A GLSL stage parsed and validated by naga.
#[derive(Debug)]
pub struct NagaUnit {
    pub module: naga::Module,
    pub info: naga::valid::ModuleInfo,
}

/// [`ShaderCompiler`] on naga's GLSL frontend and validator.
///
/// naga has no tessellation or geometry stages, so those fail to compile.
#[derive(Default)]
pub struct NagaCompiler {
    frontend: naga::front::glsl::Frontend,
}

impl NagaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn naga_stage(stage: ShaderStage) -> Result<naga::ShaderStage, String> {
        match stage {
            ShaderStage::Vertex => Ok(naga::ShaderStage::Vertex),
            ShaderStage::Fragment => Ok(naga::ShaderStage::Fragment),
            ShaderStage::Compute => Ok(naga::ShaderStage::Compute),
            other => Err(format!("{other} shaders are not supported by the naga GLSL frontend")),
        }
    }
}

impl ShaderCompiler for NagaCompiler {
    type Unit = NagaUnit;

    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<NagaUnit, String> {
        let options = naga::front::glsl::Options::from(Self::naga_stage(stage)?);
        let module = self
            .frontend
            .parse(&options, source)
            .map_err(|e| e.emit_to_string(source))?;

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

        Ok(NagaUnit { module, info })
    }

    fn link(&mut self, units: &[(ShaderStage, &NagaUnit)]) -> Result<(), String> {
        let mut seen: HashMap<(u32, u32), Resource> = HashMap::new();
        let mut errors = Vec::new();

        for &(stage, unit) in units {
            let module = &unit.module;
            for (_, var) in module.global_variables.iter() {
                let Some(binding) = &var.binding else { continue };
                let key = (binding.group, binding.binding);
                let here = Resource {
                    stage,
                    space: address_space_name(var.space),
                    // naga sizes a runtime-sized block by its fixed part only.
                    size: (!runtime_sized(module, var)).then(|| module.types[var.ty].inner.size(module.to_ctx())),
                };
                let Some(first) = seen.get(&key) else {
                    seen.insert(key, here);
                    continue;
                };

                let name = var.name.as_deref().unwrap_or("<unnamed>");
                if first.space != here.space {
                    errors.push(format!(
                        "'{name}' at group {} binding {} is {} in the {} stage but {} in the {} stage",
                        key.0, key.1, here.space, stage, first.space, first.stage
                    ));
                } else if let (Some(a), Some(b)) = (first.size, here.size)
                    && a != b
                {
                    errors.push(format!(
                        "'{name}' at group {} binding {} is {b} bytes in the {} stage but {a} bytes in the {} stage",
                        key.0, key.1, stage, first.stage
                    ));
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors.join("\n")) }
    }
}

/// A bound resource as the first stage to declare it saw it.
struct Resource {
    stage: ShaderStage,
    space: &'static str,
    size: Option<u32>,
}

fn address_space_name(space: naga::AddressSpace) -> &'static str {
    match space {
        naga::AddressSpace::Uniform => "uniform",
        naga::AddressSpace::Storage { .. } => "storage",
        naga::AddressSpace::Handle => "handle",
        _ => "other",
    }
}

fn runtime_sized(module: &naga::Module, var: &naga::GlobalVariable) -> bool {
    let is_dynamic = |ty: naga::Handle<naga::Type>| {
        matches!(
            module.types[ty].inner,
            naga::TypeInner::Array { size: naga::ArraySize::Dynamic, .. }
        )
    };
    match &module.types[var.ty].inner {
        naga::TypeInner::Struct { members, .. } => members.last().is_some_and(|m| is_dynamic(m.ty)),
        _ => is_dynamic(var.ty),
    }
}
