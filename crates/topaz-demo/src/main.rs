//! Headless run of the terrain shaders through the whole pipeline.
//!
//! Preprocesses the four terrain stages, fills the storage blocks they declare,
//! compiles and links them, and records a draw for every program that links.

mod scene;

use anyhow::{Context, Result};
use log::{info, warn};
use topaz_engine::buffer::{BindlessTextureHandle, BufferHandle, BufferManager, WgpuBufferBackend};
use topaz_engine::device::{Gpu, GpuInit};
use topaz_engine::logging::{init_logging, LoggingConfig};
use topaz_engine::render::{DrawParams, Primitive, RenderDevice};
use topaz_engine::shader::{
    BlockModule, Diagnostic, Module, NagaCompiler, Program, ProgramBuilder, ShaderPreprocessor, ShaderStage,
};

use scene::{Camera, Mvp, Scenery};

const TERRAIN: &[(ShaderStage, &str)] = &[
    (ShaderStage::Vertex, include_str!("../shaders/terrain.vert")),
    (ShaderStage::Fragment, include_str!("../shaders/terrain.frag")),
    (ShaderStage::TessellationControl, include_str!("../shaders/terrain.tesc")),
    (ShaderStage::TessellationEvaluation, include_str!("../shaders/terrain.tese")),
];

const PREVIEW: &[(ShaderStage, &str)] = &[
    (ShaderStage::Vertex, include_str!("../shaders/preview.vert")),
    (ShaderStage::Fragment, include_str!("../shaders/preview.frag")),
];

const MAX_ELEMENTS: usize = 1;

struct TerrainBuffers {
    matrices: BufferHandle,
    textures: BufferHandle,
    scenery: BufferHandle,
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    // The manager owns its backend; a clone of the GPU one lets us look up wgpu buffers.
    let (mut buffers, gpu_buffers) = match Gpu::new_blocking(GpuInit::default()) {
        Ok(gpu) => {
            info!("committing buffers to {}", gpu.adapter_info().name);
            let backend = gpu.buffer_backend();
            (BufferManager::new(backend.clone()), Some(backend))
        }
        Err(e) => {
            warn!("no GPU available ({e:#}); committing buffers to host memory");
            (BufferManager::host(), None)
        }
    };

    let mut pre = ShaderPreprocessor::default();
    let ssbo = pre.emplace_module(Module::ssbo());
    pre.emplace_module(Module::bindless_sampler());

    let terrain_sources = preprocess_all(&mut pre, &mut buffers, TERRAIN)?;

    let blocks = pre[ssbo].as_block().context("ssbo module missing")?;
    anyhow::ensure!(
        blocks.size() == 3,
        "expected 3 storage blocks in the terrain shaders, got {}",
        blocks.size()
    );
    print_blocks(blocks, &buffers, gpu_buffers.as_ref());

    let terrain = TerrainBuffers {
        matrices: blocks.get_buffer_id(0).context("matrices block")?,
        textures: blocks.get_buffer_id(1).context("texture_block")?,
        scenery: blocks.get_buffer_id(2).context("scenery_block")?,
    };
    write_scene(&mut buffers, &terrain)?;

    let preview_sources = preprocess_all(&mut pre, &mut buffers, PREVIEW)?;

    let mut builder = ProgramBuilder::new(NagaCompiler::new());
    let programs = [
        ("terrain", build(&mut builder, &terrain_sources), terrain_params()),
        ("preview", build(&mut builder, &preview_sources), preview_params()),
    ];

    let blocks = pre[ssbo].as_block().context("ssbo module missing")?;
    let mut device = RenderDevice::new();
    for (name, program, params) in &programs {
        if !program.is_usable() {
            warn!("skipping {name}: {}", program.link_log());
            continue;
        }
        device.bind_program(program)?;
        device.bind_module(blocks, &buffers)?;
        device.draw(&buffers, *params).with_context(|| format!("drawing {name}"))?;
    }

    info!("recorded {} draw(s)", device.draws().len());
    for draw in device.draws() {
        println!("  draw {:?} program {:?} with {} buffer(s)", draw.params.primitive, draw.program, draw.bindings.len());
    }
    Ok(())
}

/// Runs every stage through `pre`, in order, and returns the rewritten sources.
fn preprocess_all(
    pre: &mut ShaderPreprocessor,
    buffers: &mut BufferManager,
    stages: &[(ShaderStage, &str)],
) -> Result<Vec<(ShaderStage, String)>> {
    stages
        .iter()
        .map(|&(stage, source)| {
            pre.set_source(source);
            pre.preprocess(buffers)
                .with_context(|| format!("preprocessing the {stage} stage"))?;
            Ok((stage, pre.result().to_string()))
        })
        .collect()
}

fn build(builder: &mut ProgramBuilder<NagaCompiler>, sources: &[(ShaderStage, String)]) -> Program {
    for (stage, source) in sources {
        if let Diagnostic::CompileFailure { log, .. } = builder.compile(source, *stage) {
            println!("  {stage} stage did not compile:");
            for line in log.lines() {
                println!("    {line}");
            }
        }
    }
    builder.link()
}

fn write_scene(buffers: &mut BufferManager, terrain: &TerrainBuffers) -> Result<()> {
    // Sizes are final once the scene is written.
    let matrices_size = buffers.get(terrain.matrices)?.size();
    buffers.terminal_resize(terrain.matrices, matrices_size)?;
    let scenery_size = buffers.get(terrain.scenery)?.size();
    buffers.terminal_resize(terrain.scenery, scenery_size)?;

    let camera = Camera::default();
    let model = scene::mul(&scene::translation([1.0, 1.0, 1.0]), &scene::scale(10000.0));
    let mvp = Mvp { model, view: camera.view(), projection: camera.projection() };

    let mut mapping = buffers.map(terrain.matrices)?;
    {
        let mut pool = mapping.pool::<Mvp>();
        for i in 0..MAX_ELEMENTS {
            pool.set(i, &mvp)?;
        }
    }
    buffers.unmap(mapping)?;

    // No textures are resident in a headless run; these stand in for their handles.
    let handles = [BindlessTextureHandle(1), BindlessTextureHandle(2)];
    let mut mapping = buffers.map(terrain.textures)?;
    mapping.write_slice(0, &handles)?;
    buffers.unmap(mapping)?;

    let mut mapping = buffers.map(terrain.scenery)?;
    mapping.write(0, &Scenery::default())?;
    buffers.unmap(mapping)?;
    Ok(())
}

fn print_blocks(blocks: &BlockModule, buffers: &BufferManager, gpu: Option<&WgpuBufferBackend>) {
    println!();
    println!("  {:<16} {:<10} {:>7} {:>8} {:>10}", "block", "buffer", "binding", "bytes", "gpu bytes");
    for r in blocks.registrations() {
        let size = buffers.get(r.handle).map(|b| b.size()).unwrap_or(0);
        let gpu_size = match gpu.and_then(|g| g.buffer(r.handle)) {
            Some(buffer) => buffer.size().to_string(),
            None => "-".to_string(),
        };
        println!(
            "  {:<16} {:<10} {:>7} {:>8} {:>10}",
            r.name,
            r.handle.to_string(),
            r.binding,
            size,
            gpu_size
        );
    }
    println!();
}

fn terrain_params() -> DrawParams {
    DrawParams { primitive: Primitive::Patches { vertices: 4 }, vertex_count: 6, instance_count: 1 }
}

fn preview_params() -> DrawParams {
    DrawParams { primitive: Primitive::Triangles, vertex_count: 6, instance_count: 1 }
}
