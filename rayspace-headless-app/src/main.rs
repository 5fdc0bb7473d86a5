//! 在录制后端上跑几帧 Space，输出每帧的加速结构与描述符统计
//!
//! 用法：`rayspace-headless [pipeline.toml] [frame_count]`

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, bail};
use ash::vk;
use rayspace_crate_tools::init_log::init_log;
use rayspace_crate_tools::resource::RayspacePath;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::headless::{HeadlessDevice, RecordedCommand};
use rayspace_gfx::pipelines::shader::{GfxShaderBlob, GfxShaderStage, ShaderCompileError, ShaderCompiler};
use rayspace_gfx::resources::texture::{GfxTexture, GfxTextureDesc};
use rayspace_render_interface::frame_counter::FrameCounter;
use rayspace_render_interface::pipeline_description::SpacePipelineDescription;
use rayspace_render_interface::render_data::{RasterInfo, RenderData};
use rayspace_render_interface::shader_resources::UpdateReport;
use rayspace_scene::gpu_data::{EffectVertex, SpatialBounds, SpatialVertex};
use rayspace_scene::space::{Space, SpaceTextures};
use rayspace_utils::id_issuer::IdIssuer;
use serde::Serialize;

const DEFAULT_DESCRIPTION: &str = include_str!("../../config/space.toml");
const DEFAULT_FRAME_COUNT: usize = 4;
const FRAME_DELTA: f32 = 1.0 / 60.0;
const RESOLUTION: vk::Extent2D = vk::Extent2D {
    width: 320,
    height: 180,
};

/// 不做编译，按描述导出符号
struct PassthroughCompiler;
impl ShaderCompiler for PassthroughCompiler {
    fn compile_library(&self, path: &Path, symbols: &[String]) -> Result<GfxShaderBlob, ShaderCompileError> {
        Ok(GfxShaderBlob {
            name: path.display().to_string(),
            stage: GfxShaderStage::Library,
            exports: symbols.to_vec(),
            code: Vec::new(),
        })
    }

    fn compile_compute(&self, path: &Path) -> Result<GfxShaderBlob, ShaderCompileError> {
        Ok(GfxShaderBlob {
            name: path.display().to_string(),
            stage: GfxShaderStage::Compute,
            exports: vec!["Main".to_string()],
            code: Vec::new(),
        })
    }
}

#[derive(Serialize)]
struct FrameSummary {
    frame: String,
    blas_builds: usize,
    blas_refits: usize,
    tlas_instances: usize,
    rays_dispatched: bool,
    effect_draws: usize,
    heap_resized: bool,
    heap_size: u32,
    descriptors_written: usize,
}
impl FrameSummary {
    fn collect(frame: String, headless: &HeadlessDevice, commands: &[RecordedCommand], report: &UpdateReport) -> Self {
        let builds = commands.iter().filter_map(RecordedCommand::as_build).collect::<Vec<_>>();
        let bottom_level = |mode| {
            builds
                .iter()
                .filter(|build| build.inputs.ty == vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL && build.mode == mode)
                .count()
        };
        let tlas_instances = builds
            .iter()
            .filter(|build| build.inputs.ty == vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .map(|build| headless.tlas_instances(build).len())
            .sum();

        Self {
            frame,
            blas_builds: bottom_level(vk::BuildAccelerationStructureModeKHR::BUILD),
            blas_refits: bottom_level(vk::BuildAccelerationStructureModeKHR::UPDATE),
            tlas_instances,
            rays_dispatched: commands
                .iter()
                .any(|command| matches!(command, RecordedCommand::DispatchRays { .. })),
            effect_draws: commands
                .iter()
                .filter(|command| matches!(command, RecordedCommand::DrawInstanced { .. }))
                .count(),
            heap_resized: report.resized,
            heap_size: report.heap_size,
            descriptors_written: report.descriptors_written,
        }
    }
}

#[derive(Serialize)]
struct RunSummary {
    description: PathBuf,
    materials: usize,
    animations: usize,
    frames: Vec<FrameSummary>,
    buffers_alive: usize,
    root_signatures_created: usize,
    pipelines_created: usize,
}

fn load_description(path: Option<PathBuf>) -> anyhow::Result<(PathBuf, SpacePipelineDescription)> {
    let path = path.unwrap_or_else(|| RayspacePath::config_path("space.toml"));
    if path.exists() {
        let description = SpacePipelineDescription::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        return Ok((path, description));
    }

    log::warn!("{} not found, using the built-in description", path.display());
    let description =
        SpacePipelineDescription::from_toml_str(DEFAULT_DESCRIPTION).context("parsing the built-in description")?;
    Ok((PathBuf::from("<built-in>"), description))
}

/// 每个材质一个 mesh，外加一条光栅效果
fn populate(space: &mut Space, description: &SpacePipelineDescription) -> anyhow::Result<()> {
    for (index, material) in description.materials.iter().enumerate() {
        let mesh = space.create_mesh(index).with_context(|| format!("creating mesh '{}'", material.name))?;
        space.set_drawable_enabled(mesh, true);
        space.set_drawable_transform(mesh, glam::vec3(index as f32 * 2.0, 0.0, -5.0), glam::Quat::IDENTITY);
        if material.normal_intersection_symbol.is_some() {
            let bounds = SpatialBounds {
                min: [-0.5; 3],
                max: [0.5; 3],
                data: [0; 4],
            };
            space.set_mesh_bounds(mesh, &[bounds])?;
        } else {
            let quad = [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]]
                .map(|position| SpatialVertex { position, data: 0 });
            space.set_mesh_vertices(mesh, &quad)?;
        }
    }

    let shader = |name: &str, stage| GfxShaderBlob {
        name: name.to_string(),
        stage,
        exports: vec!["Main".to_string()],
        code: Vec::new(),
    };
    let lines = space
        .create_raster_pipeline(
            &shader("shader/lines.vs", GfxShaderStage::Vertex),
            &shader("shader/lines.ps", GfxShaderStage::Pixel),
            "lines",
        )
        .context("creating the line pipeline")?;
    let effect = space.create_effect(lines)?;
    space.set_drawable_enabled(effect, true);
    let axis = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]].map(|position| EffectVertex { position, data: 0 });
    space.set_effect_vertices(effect, &axis)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_log();

    let mut args = std::env::args().skip(1);
    let config = args.next().map(PathBuf::from);
    let frame_count = match args.next() {
        Some(count) => count.parse().with_context(|| format!("invalid frame count '{count}'"))?,
        None => DEFAULT_FRAME_COUNT,
    };
    let (config, description) = load_description(config)?;

    let headless = Rc::new(HeadlessDevice::new());
    let device: Rc<dyn GfxDevice> = headless.clone();
    let ids = Rc::new(IdIssuer::new());

    let mut space = Space::new(&device, ids).context("creating the space")?;
    space.perform_initial_setup_step_one()?;
    space.perform_resolution_dependent_setup(RESOLUTION)?;
    let mut compile_errors = Vec::new();
    let ready = space.perform_initial_setup_step_two(
        &description,
        &PassthroughCompiler,
        SpaceTextures::default(),
        &mut |error| compile_errors.push(error.clone()),
    )?;
    if !ready {
        bail!("space setup aborted: {} shader errors", compile_errors.len());
    }
    space.spool_up()?;
    space.cleanup_render();
    headless.take_commands();

    populate(&mut space, &description)?;

    let targets = [
        GfxTexture::new(
            &device,
            GfxTextureDesc::storage_2d(RESOLUTION, vk::Format::B8G8R8A8_UNORM, "render target"),
        )?,
        GfxTexture::new(
            &device,
            GfxTextureDesc::storage_2d(RESOLUTION, vk::Format::D32_SFLOAT, "depth stencil"),
        )?,
    ];
    let render_data = RenderData {
        render_target: targets[0].handle(),
        depth_stencil: targets[1].handle(),
        raster: RasterInfo::full(RESOLUTION),
    };

    let mut counter = FrameCounter::new(0);
    let mut frames = Vec::with_capacity(frame_count);
    for _ in 0..frame_count {
        let _span = tracy_client::span!("frame");
        space.reset(*counter.frame_label());
        space.update(FRAME_DELTA)?;
        space.render(&render_data).with_context(|| format!("rendering {}", counter.frame_name()))?;
        space.cleanup_render();

        let commands = headless.take_commands();
        frames.push(FrameSummary::collect(
            counter.frame_name(),
            &headless,
            &commands,
            space.last_update_report(),
        ));
        counter.next_frame();
    }

    let stats = headless.stats();
    let summary = RunSummary {
        description: config,
        materials: space.material_count(),
        animations: space.animations().len(),
        frames,
        buffers_alive: stats.buffers_alive,
        root_signatures_created: stats.root_signatures_created,
        pipelines_created: stats.pipelines_created,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    log::info!("headless run finished after {frame_count} frames");
    Ok(())
}
