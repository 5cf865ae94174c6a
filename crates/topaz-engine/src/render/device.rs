use crate::buffer::{BufferHandle, BufferKind, BufferManager};
use crate::shader::{BlockModule, Program, ProgramId};

use super::error::RenderError;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Primitive {
    Triangles,
    /// Tessellation patches with the given number of control points.
    Patches { vertices: u32 },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawParams {
    pub primitive: Primitive,
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl Default for DrawParams {
    fn default() -> Self {
        Self { primitive: Primitive::Triangles, vertex_count: 3, instance_count: 1 }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferBinding {
    pub kind: BufferKind,
    pub binding: u32,
    pub handle: BufferHandle,
}

/// A validated draw, with the state it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCommand {
    pub program: ProgramId,
    pub params: DrawParams,
    pub bindings: Vec<BufferBinding>,
}

#[derive(Debug, Default)]
pub struct RenderDevice {
    program: Option<ProgramId>,
    bindings: Vec<BufferBinding>,
    draws: Vec<DrawCommand>,
}

impl RenderDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_program(&mut self, program: &Program) -> Result<(), RenderError> {
        if !program.is_usable() {
            return Err(RenderError::ProgramNotLinked(program.id()));
        }
        self.program = Some(program.id());
        Ok(())
    }

    pub fn bound_program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Binds `handle` at `binding` of the `kind` namespace, replacing what was there.
    pub fn bind_buffer(
        &mut self,
        kind: BufferKind,
        binding: u32,
        handle: BufferHandle,
        buffers: &BufferManager,
    ) -> Result<(), RenderError> {
        buffers.get_kind(handle, kind)?;
        let entry = BufferBinding { kind, binding, handle };
        match self.bindings.iter_mut().find(|b| b.kind == kind && b.binding == binding) {
            Some(slot) => *slot = entry,
            None => self.bindings.push(entry),
        }
        Ok(())
    }

    /// Binds every block of `module` at the binding index it was emitted with.
    pub fn bind_module(&mut self, module: &BlockModule, buffers: &BufferManager) -> Result<(), RenderError> {
        for r in module.registrations() {
            self.bind_buffer(module.kind(), r.binding, r.handle, buffers)?;
        }
        Ok(())
    }

    pub fn unbind_buffer(&mut self, kind: BufferKind, binding: u32) {
        self.bindings.retain(|b| !(b.kind == kind && b.binding == binding));
    }

    pub fn bindings(&self) -> &[BufferBinding] {
        &self.bindings
    }

    /// Checks the bound state and records a draw.
    pub fn draw(&mut self, buffers: &BufferManager, params: DrawParams) -> Result<&DrawCommand, RenderError> {
        let program = self.program.ok_or(RenderError::NoProgram)?;
        for binding in &self.bindings {
            let object = buffers.get_kind(binding.handle, binding.kind)?;
            if object.is_mapped() {
                return Err(RenderError::BufferMapped(binding.handle));
            }
            if object.is_undersized() {
                return Err(RenderError::Undersized {
                    handle: binding.handle,
                    size: object.size(),
                    required: object.min_size(),
                });
            }
        }

        let mut bindings = self.bindings.clone();
        bindings.sort_by_key(|b| (b.kind == BufferKind::ShaderStorage, b.binding));
        log::debug!("draw {params:?} with {program:?}, {} buffer(s)", bindings.len());
        self.draws.push(DrawCommand { program, params, bindings });
        Ok(&self.draws[self.draws.len() - 1])
    }

    pub fn draws(&self) -> &[DrawCommand] {
        &self.draws
    }

    /// Hands over the recorded draws, leaving the list empty.
    pub fn take_draws(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferError;
    use crate::shader::{ProgramBuilder, ShaderCompiler, ShaderStage};

    struct AcceptAll;

    impl ShaderCompiler for AcceptAll {
        type Unit = ();

        fn compile(&mut self, _stage: ShaderStage, source: &str) -> Result<(), String> {
            if source.is_empty() { Err("empty source".into()) } else { Ok(()) }
        }

        fn link(&mut self, _units: &[(ShaderStage, &())]) -> Result<(), String> {
            Ok(())
        }
    }

    fn program(fragment: &str) -> Program {
        let mut b = ProgramBuilder::new(AcceptAll);
        b.compile("v", ShaderStage::Vertex);
        b.compile(fragment, ShaderStage::Fragment);
        b.link()
    }

    fn scene() -> (BufferManager, BlockModule) {
        let mut buffers = BufferManager::host();
        let mut ssbo = BlockModule::ssbo();
        let mut src = "#ssbo a { vec4 x; };\n#ssbo b { mat4 m; };".to_string();
        ssbo.apply(&mut src, &mut buffers).unwrap();
        (buffers, ssbo)
    }

    // ── program ───────────────────────────────────────────────────────────

    #[test]
    fn failed_program_cannot_be_bound() {
        let mut device = RenderDevice::new();
        let broken = program("");
        assert_eq!(device.bind_program(&broken), Err(RenderError::ProgramNotLinked(broken.id())));
        assert_eq!(device.bound_program(), None);
    }

    #[test]
    fn draw_needs_a_program() {
        let buffers = BufferManager::host();
        let mut device = RenderDevice::new();
        assert_eq!(device.draw(&buffers, DrawParams::default()).err(), Some(RenderError::NoProgram));
    }

    // ── buffers ───────────────────────────────────────────────────────────

    #[test]
    fn module_bindings_follow_emitted_indices() {
        let (buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        device.bind_module(&ssbo, &buffers).unwrap();

        let bound: Vec<_> = device.bindings().iter().map(|b| (b.binding, b.handle)).collect();
        assert_eq!(
            bound,
            [(0, ssbo.get_buffer_id(0).unwrap()), (1, ssbo.get_buffer_id(1).unwrap())]
        );
    }

    #[test]
    fn bind_checks_kind() {
        let (buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        let h = ssbo.get_buffer_id(0).unwrap();
        assert!(matches!(
            device.bind_buffer(BufferKind::Uniform, 0, h, &buffers),
            Err(RenderError::Buffer(BufferError::KindMismatch { .. }))
        ));
    }

    #[test]
    fn rebinding_replaces() {
        let (buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        let (a, b) = (ssbo.get_buffer_id(0).unwrap(), ssbo.get_buffer_id(1).unwrap());
        device.bind_buffer(BufferKind::ShaderStorage, 3, a, &buffers).unwrap();
        device.bind_buffer(BufferKind::ShaderStorage, 3, b, &buffers).unwrap();
        assert_eq!(device.bindings().len(), 1);
        assert_eq!(device.bindings()[0].handle, b);

        device.unbind_buffer(BufferKind::ShaderStorage, 3);
        assert!(device.bindings().is_empty());
    }

    // ── draw ──────────────────────────────────────────────────────────────

    #[test]
    fn draw_records_state() {
        let (buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        let p = program("f");
        device.bind_program(&p).unwrap();
        device.bind_module(&ssbo, &buffers).unwrap();

        let params = DrawParams { primitive: Primitive::Patches { vertices: 4 }, vertex_count: 4, instance_count: 1 };
        let cmd = device.draw(&buffers, params).unwrap().clone();
        assert_eq!(cmd.program, p.id());
        assert_eq!(cmd.bindings.len(), 2);
        assert_eq!(device.take_draws(), [cmd]);
        assert!(device.draws().is_empty());
    }

    #[test]
    fn draw_refuses_mapped_buffers() {
        let (buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        device.bind_program(&program("f")).unwrap();
        device.bind_module(&ssbo, &buffers).unwrap();

        let h = ssbo.get_buffer_id(1).unwrap();
        let mapping = buffers.map(h).unwrap();
        assert_eq!(device.draw(&buffers, DrawParams::default()).err(), Some(RenderError::BufferMapped(h)));
        buffers.unmap(mapping).unwrap();
        assert!(device.draw(&buffers, DrawParams::default()).is_ok());
    }

    #[test]
    fn draw_refuses_undersized_buffers() {
        let (mut buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        device.bind_program(&program("f")).unwrap();
        device.bind_module(&ssbo, &buffers).unwrap();

        let h = ssbo.get_buffer_id(0).unwrap();
        buffers.resize(h, 8).unwrap();
        assert_eq!(
            device.draw(&buffers, DrawParams::default()).err(),
            Some(RenderError::Undersized { handle: h, size: 8, required: 16 })
        );
    }

    #[test]
    fn draw_refuses_destroyed_buffers() {
        let (mut buffers, ssbo) = scene();
        let mut device = RenderDevice::new();
        device.bind_program(&program("f")).unwrap();
        device.bind_module(&ssbo, &buffers).unwrap();

        let h = ssbo.get_buffer_id(0).unwrap();
        buffers.destroy(h).unwrap();
        assert_eq!(
            device.draw(&buffers, DrawParams::default()).err(),
            Some(RenderError::Buffer(BufferError::InvalidHandle(h)))
        );
    }
}
