use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use super::compiler::{ShaderCompiler, ShaderStage};

/// Outcome of a compile or link step. Bad shaders are a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Success,
    CompileFailure { stage: ShaderStage, log: String },
    LinkFailure { log: String },
}

impl Diagnostic {
    pub fn is_success(&self) -> bool {
        matches!(self, Diagnostic::Success)
    }

    pub fn log(&self) -> Option<&str> {
        match self {
            Diagnostic::Success => None,
            Diagnostic::CompileFailure { log, .. } | Diagnostic::LinkFailure { log } => Some(log),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Success => f.write_str("success"),
            Diagnostic::CompileFailure { stage, log } => write!(f, "{stage} stage failed to compile:\n{log}"),
            Diagnostic::LinkFailure { log } => write!(f, "program failed to link:\n{log}"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(u32);

static NEXT_PROGRAM_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProgramState {
    Linked,
    /// Some stage failed to compile, or linking failed. Never becomes usable.
    Failed,
}

/// What happened to one attached stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: ShaderStage,
    pub compiled: bool,
    /// Compiler output; empty on success.
    pub log: String,
}

/// The result of [`ProgramBuilder::link`].
#[derive(Debug, Clone)]
pub struct Program {
    id: ProgramId,
    state: ProgramState,
    stages: Vec<StageRecord>,
    link_log: String,
}

impl Program {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn is_usable(&self) -> bool {
        self.state == ProgramState::Linked
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn link_log(&self) -> &str {
        &self.link_log
    }

    /// The link step as a [`Diagnostic`].
    pub fn diagnostic(&self) -> Diagnostic {
        match self.state {
            ProgramState::Linked => Diagnostic::Success,
            ProgramState::Failed => Diagnostic::LinkFailure { log: self.link_log.clone() },
        }
    }
}

struct Attached<U> {
    stage: ShaderStage,
    unit: Option<U>,
    log: String,
}

/// Compiles stages one by one and links them into a [`Program`].
pub struct ProgramBuilder<C: ShaderCompiler> {
    compiler: C,
    attached: Vec<Attached<C::Unit>>,
}

impl<C: ShaderCompiler> ProgramBuilder<C> {
    pub fn new(compiler: C) -> Self {
        Self { compiler, attached: Vec::new() }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Stages attached since the last link.
    pub fn attached(&self) -> impl Iterator<Item = ShaderStage> + '_ {
        self.attached.iter().map(|a| a.stage)
    }

    /// Compiles `source` for `stage` and attaches it, failed or not.
    pub fn compile(&mut self, source: &str, stage: ShaderStage) -> Diagnostic {
        match self.compiler.compile(stage, source) {
            Ok(unit) => {
                log::debug!("compiled {stage} stage");
                self.attached.push(Attached { stage, unit: Some(unit), log: String::new() });
                Diagnostic::Success
            }
            Err(log) => {
                log::warn!("{stage} stage failed to compile: {log}");
                self.attached.push(Attached { stage, unit: None, log: log.clone() });
                Diagnostic::CompileFailure { stage, log }
            }
        }
    }

    /// Links everything attached so far and resets the builder.
    pub fn link(&mut self) -> Program {
        let attached = std::mem::take(&mut self.attached);
        let (state, link_log) = match self.check(&attached) {
            Ok(()) => (ProgramState::Linked, String::new()),
            Err(log) => (ProgramState::Failed, log),
        };

        let id = ProgramId(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed));
        match state {
            ProgramState::Linked => log::debug!("linked program {id:?} with {} stage(s)", attached.len()),
            ProgramState::Failed => log::warn!("program {id:?} failed to link: {link_log}"),
        }

        let stages = attached
            .into_iter()
            .map(|a| StageRecord { stage: a.stage, compiled: a.unit.is_some(), log: a.log })
            .collect();
        Program { id, state, stages, link_log }
    }

    fn check(&mut self, attached: &[Attached<C::Unit>]) -> Result<(), String> {
        if attached.is_empty() {
            return Err("no shader stages attached".into());
        }

        let failed: Vec<_> = attached.iter().filter(|a| a.unit.is_none()).map(|a| a.stage.name()).collect();
        if !failed.is_empty() {
            return Err(format!("stage(s) failed to compile: {}", failed.join(", ")));
        }

        let mut stages: Vec<_> = attached.iter().map(|a| a.stage).collect();
        stages.sort();
        if let Some(pair) = stages.windows(2).find(|w| w[0] == w[1]) {
            return Err(format!("{} stage attached more than once", pair[0]));
        }

        let has = |s| stages.contains(&s);
        if has(ShaderStage::Compute) {
            if stages.iter().any(|s| s.is_graphics()) {
                return Err("a compute stage cannot be linked with graphics stages".into());
            }
        } else {
            if !has(ShaderStage::Vertex) {
                return Err("graphics program has no vertex stage".into());
            }
            if !has(ShaderStage::Fragment) {
                return Err("graphics program has no fragment stage".into());
            }
            if has(ShaderStage::TessellationControl) && !has(ShaderStage::TessellationEvaluation) {
                return Err("tessellation control stage without a tessellation evaluation stage".into());
            }
        }

        let units: Vec<_> = attached
            .iter()
            .filter_map(|a| a.unit.as_ref().map(|u| (a.stage, u)))
            .collect();
        self.compiler.link(&units)
    }
}
