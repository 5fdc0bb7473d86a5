//! 光追场景的入口
//!
//! [`Space`] 是全部可绘制对象、材质、动画控制器和加速结构的唯一持有者。
//! 对象之间只通过 [`DrawableHandle`] 与各类稳定索引相互引用。
//!
//! 初始化顺序：
//! 1. [`Space::perform_initial_setup_step_one`]
//! 2. [`Space::perform_resolution_dependent_setup`]
//! 3. [`Space::perform_initial_setup_step_two`]
//! 4. [`Space::spool_up`]
//!
//! 每帧：[`Space::reset`] -> [`Space::update`] -> [`Space::render`] -> [`Space::cleanup_render`]。

mod list_source;
mod render;
mod setup;

use std::rc::Rc;

use ash::vk;
use indexmap::IndexMap;
use rayspace_gfx::commands::barrier::GfxResourceState;
use rayspace_gfx::commands::command_list::GfxCommandList;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::pipelines::shader::GfxShaderBlob;
use rayspace_gfx::raytracing::in_buffer_allocator::GfxInBufferAllocator;
use rayspace_gfx::raytracing::sbt::GfxShaderBindingTable;
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::handles::PipelineHandle;
use rayspace_gfx::resources::texture::GfxTexture;
use rayspace_render_interface::shader_resources::{ListHandle, ShaderResources, TableEntry, UpdateReport};
use rayspace_utils::bag::Bag;
use rayspace_utils::id_issuer::IdIssuer;

use crate::animation::AnimationController;
use crate::camera::Camera;
use crate::drawable::{
    ActiveChange, CommonIndex, Drawable, DrawableArena, DrawableHandle, DrawableKind, DrawableVariant,
    DrawableVisitor, Effect, Mesh,
};
use crate::drawables_group::{DrawablesGroup, variant, variant_mut};
use crate::gpu_data::{EffectVertex, GlobalBuffer, SpatialBounds, SpatialVertex};
use crate::light::Light;
use crate::material::Material;
use crate::raster_pipeline::{EffectBindings, RasterPipeline};
use crate::shader_buffer::ShaderBuffer;
use crate::shared_index_buffer::SharedIndexBuffer;

pub use setup::SpaceTextures;

/// 同时在录制的帧数
pub const FRAMES_IN_FLIGHT: usize = 2;

/// 一次 TLAS 构建用到的 buffer，被下一次构建替换后保留到 [`Space::cleanup_render`]
struct Tlas {
    result: GfxBuffer,
    scratch: GfxBuffer,
    instance_descs: GfxBuffer,
}

/// 全局根签名中由 Space 自己写入的位置
#[derive(Copy, Clone, Debug)]
struct GlobalLayout {
    /// 图形侧：光追输出，供光栅效果采样
    color_srv: TableEntry,
    depth_srv: TableEntry,

    /// 计算侧：两个纹理槽
    textures: [TableEntry; 2],
    /// 计算侧：每帧刷新的 TLAS 与输出
    bvh: TableEntry,
    color_uav: TableEntry,
    depth_uav: TableEntry,

    /// 按激活序号排列的 mesh 实例常量与几何
    mesh_instances: ListHandle,
    mesh_geometry: ListHandle,
}

/// 第二步初始化之后才存在的部分
struct SpacePipeline {
    resources: ShaderResources,
    layout: GlobalLayout,
    effect_bindings: EffectBindings,

    rt_pipeline: PipelineHandle,
    sbt: GfxShaderBindingTable,
}

pub struct Space {
    device: Rc<dyn GfxDevice>,
    ids: Rc<IdIssuer>,
    cmd: Box<dyn GfxCommandList>,

    resolution: vk::Extent2D,
    time: f32,
    camera: Camera,
    light: Light,
    globals: GlobalBuffer,
    global_buffer: ShaderBuffer,
    custom_data: Option<ShaderBuffer>,

    drawables: DrawableArena,
    all_drawables: Bag<DrawableHandle, CommonIndex>,
    meshes: DrawablesGroup<Mesh>,
    effects: DrawablesGroup<Effect>,
    index_buffer: SharedIndexBuffer,

    materials: IndexMap<String, Material>,
    animations: Vec<AnimationController>,
    raster_pipelines: Vec<RasterPipeline>,
    mesh_spool_count: u32,
    effect_spool_count: u32,

    blas_result_allocator: GfxInBufferAllocator,
    blas_scratch_allocator: GfxInBufferAllocator,
    tlas: Option<Tlas>,
    retired_tlas: Vec<Tlas>,

    sentinel_texture: Option<GfxTexture>,
    color_output: Option<GfxTexture>,
    depth_output: Option<GfxTexture>,

    pipeline: Option<SpacePipeline>,
    last_update: UpdateReport,
}
// new & init
impl Space {
    pub fn new(device: &Rc<dyn GfxDevice>, ids: Rc<IdIssuer>) -> GfxResult<Self> {
        let cmd = device.create_command_list(FRAMES_IN_FLIGHT, "space")?;
        let camera = Camera::new(device, &ids)?;
        let globals = GlobalBuffer::default();
        let global_buffer = ShaderBuffer::with_data(device, &globals, "space globals")?;

        log::info!("space created with camera {}", camera.id());

        Ok(Self {
            device: device.clone(),
            ids,
            cmd,
            resolution: vk::Extent2D { width: 0, height: 0 },
            time: 0.0,
            camera,
            light: Light::default(),
            globals,
            global_buffer,
            custom_data: None,
            drawables: DrawableArena::with_key(),
            all_drawables: Bag::new(),
            meshes: DrawablesGroup::new(),
            effects: DrawablesGroup::new(),
            index_buffer: SharedIndexBuffer::new(device),
            materials: IndexMap::new(),
            animations: Vec::new(),
            raster_pipelines: Vec::new(),
            mesh_spool_count: 0,
            effect_spool_count: 0,
            blas_result_allocator: GfxInBufferAllocator::new(
                device,
                GfxResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
                "blas-result",
            ),
            blas_scratch_allocator: GfxInBufferAllocator::new(device, GfxResourceState::UNORDERED_ACCESS, "blas-scratch"),
            tlas: None,
            retired_tlas: Vec::new(),
            sentinel_texture: None,
            color_output: None,
            depth_output: None,
            pipeline: None,
            last_update: UpdateReport::default(),
        })
    }
}
// getter
impl Space {
    #[inline]
    pub fn ids(&self) -> &Rc<IdIssuer> {
        &self.ids
    }

    /// 本帧录制用的命令列表，`render` 之后由宿主提交
    #[inline]
    pub fn command_list(&self) -> &dyn GfxCommandList {
        self.cmd.as_ref()
    }

    #[inline]
    pub fn resolution(&self) -> vk::Extent2D {
        self.resolution
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[inline]
    pub fn light(&self) -> &Light {
        &self.light
    }

    #[inline]
    pub fn light_mut(&mut self) -> &mut Light {
        &mut self.light
    }

    #[inline]
    pub fn globals(&self) -> &GlobalBuffer {
        &self.globals
    }

    #[inline]
    pub fn custom_data(&self) -> Option<&ShaderBuffer> {
        self.custom_data.as_ref()
    }

    #[inline]
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    #[inline]
    pub fn material_index(&self, name: &str) -> Option<usize> {
        self.materials.get_index_of(name)
    }

    pub fn material(&self, index: usize) -> &Material {
        match self.materials.get_index(index) {
            Some((_, material)) => material,
            None => panic!("material {index} does not exist"),
        }
    }

    #[inline]
    pub fn animations(&self) -> &[AnimationController] {
        &self.animations
    }

    #[inline]
    pub fn raster_pipelines(&self) -> &[RasterPipeline] {
        &self.raster_pipelines
    }

    #[inline]
    pub fn drawable(&self, handle: DrawableHandle) -> &Drawable {
        &self.drawables[handle]
    }

    #[inline]
    pub fn mesh(&self, handle: DrawableHandle) -> &Mesh {
        variant::<Mesh>(&self.drawables, handle)
    }

    #[inline]
    pub fn effect(&self, handle: DrawableHandle) -> &Effect {
        variant::<Effect>(&self.drawables, handle)
    }

    #[inline]
    pub fn meshes(&self) -> &DrawablesGroup<Mesh> {
        &self.meshes
    }

    #[inline]
    pub fn effects(&self) -> &DrawablesGroup<Effect> {
        &self.effects
    }

    /// 所有存活对象的数量，不含对象池
    #[inline]
    pub fn drawable_count(&self) -> usize {
        self.all_drawables.count()
    }

    #[inline]
    pub fn shader_resources(&self) -> Option<&ShaderResources> {
        self.pipeline.as_ref().map(|pipeline| &pipeline.resources)
    }

    /// 最近一次 `render` 中着色器资源的更新情况
    #[inline]
    pub fn last_update_report(&self) -> &UpdateReport {
        &self.last_update
    }

    #[inline]
    pub fn tlas_address(&self) -> Option<vk::DeviceAddress> {
        self.tlas.as_ref().map(|tlas| tlas.result.device_address())
    }
}
// 可绘制对象
impl Space {
    /// 使用第 `material_index` 个材质创建 mesh，初始为禁用且没有几何
    pub fn create_mesh(&mut self, material_index: usize) -> GfxResult<DrawableHandle> {
        let info = self.material(material_index).info();
        self.meshes.create(
            &mut self.drawables,
            &mut self.all_drawables,
            || Mesh::new(&self.device, &self.ids),
            |mesh| mesh.initialize(info),
        )
    }

    /// 使用第 `pipeline` 个光栅管线创建效果
    pub fn create_effect(&mut self, pipeline: usize) -> GfxResult<DrawableHandle> {
        assert!(
            pipeline < self.raster_pipelines.len(),
            "raster pipeline {pipeline} does not exist ({} created)",
            self.raster_pipelines.len()
        );
        self.effects.create(
            &mut self.drawables,
            &mut self.all_drawables,
            || Effect::new(&self.device, &self.ids),
            |effect| effect.initialize(pipeline),
        )
    }

    /// 以 Space 的图形根签名创建光栅管线，返回其序号
    pub fn create_raster_pipeline(
        &mut self,
        vertex_shader: &GfxShaderBlob,
        pixel_shader: &GfxShaderBlob,
        name: impl Into<String>,
    ) -> GfxResult<usize> {
        let Some(pipeline) = &self.pipeline else {
            panic!("raster pipeline created before the initial setup step two");
        };
        let raster = RasterPipeline::new(
            &self.device,
            &self.ids,
            vertex_shader,
            pixel_shader,
            pipeline.resources.graphics_root_signature(),
            name,
        )?;
        log::info!("raster pipeline '{}' created as {}", raster.name(), raster.id());
        self.raster_pipelines.push(raster);
        Ok(self.raster_pipelines.len() - 1)
    }

    pub fn set_drawable_enabled(&mut self, handle: DrawableHandle, enabled: bool) {
        let change = self.drawables[handle].common_mut().set_enabled(enabled);
        self.handle_drawable_change(handle, change, false);
    }

    /// 只影响实例常量与 TLAS 中的变换，不需要重新上传几何
    pub fn set_drawable_transform(&mut self, handle: DrawableHandle, position: glam::Vec3, rotation: glam::Quat) {
        self.drawables[handle].common_mut().set_transform(position, rotation);
    }

    pub fn set_mesh_vertices(&mut self, handle: DrawableHandle, vertices: &[SpatialVertex]) -> GfxResult<()> {
        let change = variant_mut::<Mesh>(&mut self.drawables, handle).set_new_vertices(vertices)?;
        self.handle_drawable_change(handle, change, true);
        Ok(())
    }

    pub fn set_mesh_bounds(&mut self, handle: DrawableHandle, bounds: &[SpatialBounds]) -> GfxResult<()> {
        let change = variant_mut::<Mesh>(&mut self.drawables, handle).set_new_bounds(bounds)?;
        self.handle_drawable_change(handle, change, true);
        Ok(())
    }

    pub fn set_effect_vertices(&mut self, handle: DrawableHandle, vertices: &[EffectVertex]) -> GfxResult<()> {
        let change = variant_mut::<Effect>(&mut self.drawables, handle).set_new_vertices(vertices)?;
        self.handle_drawable_change(handle, change, true);
        Ok(())
    }

    /// 归还对象，之后 handle 只能由新的 `create_*` 重新取得
    pub fn return_drawable(&mut self, handle: DrawableHandle) {
        if self.drawables[handle].common().is_active() {
            self.handle_drawable_change(handle, ActiveChange::Deactivate, false);
        }

        match self.drawables[handle].kind() {
            DrawableKind::Mesh => self.meshes.return_drawable(
                handle,
                variant_mut::<Mesh>(&mut self.drawables, handle),
                &mut self.all_drawables,
            ),
            DrawableKind::Effect => self.effects.return_drawable(
                handle,
                variant_mut::<Effect>(&mut self.drawables, handle),
                &mut self.all_drawables,
            ),
        }
    }

    /// 把一次修改落到分组与动画控制器的记录上
    fn handle_drawable_change(&mut self, handle: DrawableHandle, change: ActiveChange, modified: bool) {
        let mut visitor = ChangeVisitor {
            handle,
            change,
            modified,
            meshes: &mut self.meshes,
            effects: &mut self.effects,
            animations: &mut self.animations,
        };
        self.drawables[handle].accept(&mut visitor);
    }
}

/// 修改一个对象后维护分组的修改集合、激活集合以及动画成员
struct ChangeVisitor<'a> {
    handle: DrawableHandle,
    change: ActiveChange,
    modified: bool,

    meshes: &'a mut DrawablesGroup<Mesh>,
    effects: &'a mut DrawablesGroup<Effect>,
    animations: &'a mut [AnimationController],
}
impl DrawableVisitor for ChangeVisitor<'_> {
    type Output = ();

    fn visit_mesh(&mut self, mesh: &mut Mesh) {
        if self.modified {
            self.meshes.mark_modified(mesh);
        }

        let animation = mesh.material().animation;
        match self.change {
            ActiveChange::Activate => {
                self.meshes.activate(self.handle, mesh);
                if let Some(animation) = animation {
                    self.animations[animation].add_mesh(self.handle, mesh);
                }
            }
            ActiveChange::Deactivate => {
                if let Some(animation) = animation {
                    self.animations[animation].remove_mesh(mesh);
                }
                self.meshes.deactivate(mesh);
            }
            ActiveChange::Unchanged => {
                if self.modified && mesh.common().is_active() {
                    if let Some(animation) = animation {
                        self.animations[animation].update_mesh(mesh);
                    }
                }
            }
        }
    }

    fn visit_effect(&mut self, effect: &mut Effect) {
        if self.modified {
            self.effects.mark_modified(effect);
        }

        match self.change {
            ActiveChange::Activate => self.effects.activate(self.handle, effect),
            ActiveChange::Deactivate => self.effects.deactivate(effect),
            ActiveChange::Unchanged => {}
        }
    }
}

/// 每帧的逐对象更新
struct FrameUpdateVisitor<'a> {
    camera: &'a Camera,
}
impl DrawableVisitor for FrameUpdateVisitor<'_> {
    type Output = GfxResult<()>;

    fn visit_mesh(&mut self, mesh: &mut Mesh) -> GfxResult<()> {
        mesh.update()
    }

    fn visit_effect(&mut self, effect: &mut Effect) -> GfxResult<()> {
        effect.update(self.camera)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use rayspace_gfx::headless::{HeadlessDevice, RecordedCommand};
    use rayspace_gfx::pipelines::shader::{GfxShaderStage, ShaderCompileError, ShaderCompiler};
    use rayspace_gfx::raytracing::acceleration::GfxAccelerationStructureBuild;
    use rayspace_gfx::resources::texture::GfxTextureDesc;
    use rayspace_render_interface::pipeline_description::{
        MaterialDescription, ShaderFileDescription, SpacePipelineDescription,
    };
    use rayspace_render_interface::render_data::{RasterInfo, RenderData};

    const SOLID: usize = 0;
    const WAVE: usize = 1;
    const ORB: usize = 2;

    /// 按描述原样导出符号的编译器
    struct EchoCompiler {
        failing: Option<&'static str>,
    }
    impl EchoCompiler {
        fn check(&self, path: &Path) -> Result<(), ShaderCompileError> {
            match self.failing {
                Some(failing) if path == Path::new(failing) => Err(ShaderCompileError {
                    path: path.to_path_buf(),
                    message: "unexpected token".to_string(),
                }),
                _ => Ok(()),
            }
        }
    }
    impl ShaderCompiler for EchoCompiler {
        fn compile_library(&self, path: &Path, symbols: &[String]) -> Result<GfxShaderBlob, ShaderCompileError> {
            self.check(path)?;
            Ok(GfxShaderBlob {
                name: path.display().to_string(),
                stage: GfxShaderStage::Library,
                exports: symbols.to_vec(),
                code: Vec::new(),
            })
        }

        fn compile_compute(&self, path: &Path) -> Result<GfxShaderBlob, ShaderCompileError> {
            self.check(path)?;
            Ok(GfxShaderBlob {
                name: path.display().to_string(),
                stage: GfxShaderStage::Compute,
                exports: vec!["Main".to_string()],
                code: Vec::new(),
            })
        }
    }

    fn description() -> SpacePipelineDescription {
        let symbols = ["RayGen", "Miss", "ShadowMiss", "SolidHit", "ShadowHit", "WaveHit", "OrbHit", "OrbIntersect"];
        SpacePipelineDescription {
            shader_files: vec![
                ShaderFileDescription {
                    path: "shaders/space.hlsl".into(),
                    symbols: symbols.map(String::from).to_vec(),
                },
                ShaderFileDescription {
                    path: "shaders/wave.hlsl".into(),
                    symbols: Vec::new(),
                },
            ],
            materials: vec![
                MaterialDescription {
                    name: "solid".to_string(),
                    normal_closest_hit_symbol: "SolidHit".to_string(),
                    shadow_closest_hit_symbol: "ShadowHit".to_string(),
                    ..Default::default()
                },
                MaterialDescription {
                    name: "wave".to_string(),
                    is_animated: true,
                    animation_shader_index: 0,
                    normal_closest_hit_symbol: "WaveHit".to_string(),
                    shadow_closest_hit_symbol: "ShadowHit".to_string(),
                    ..Default::default()
                },
                MaterialDescription {
                    name: "orb".to_string(),
                    opaque: false,
                    normal_closest_hit_symbol: "OrbHit".to_string(),
                    normal_intersection_symbol: Some("OrbIntersect".to_string()),
                    shadow_closest_hit_symbol: "ShadowHit".to_string(),
                    shadow_intersection_symbol: Some("OrbIntersect".to_string()),
                    ..Default::default()
                },
            ],
            texture_count_first_slot: 2,
            custom_data_buffer_size: 64,
            mesh_spool_count: 2,
            effect_spool_count: 1,
            ..Default::default()
        }
    }

    struct Fixture {
        headless: Rc<HeadlessDevice>,
        space: Space,
        targets: [GfxTexture; 2],
    }
    impl Fixture {
        fn new() -> Self {
            rayspace_crate_tools::init_log::init_test_log();

            let headless = Rc::new(HeadlessDevice::new());
            let device: Rc<dyn GfxDevice> = headless.clone();
            let extent = vk::Extent2D { width: 8, height: 6 };

            let mut space = Space::new(&device, Rc::new(IdIssuer::new())).unwrap();
            space.perform_initial_setup_step_one().unwrap();
            space.perform_resolution_dependent_setup(extent).unwrap();
            let ready = space
                .perform_initial_setup_step_two(
                    &description(),
                    &EchoCompiler { failing: None },
                    SpaceTextures::default(),
                    &mut |error| panic!("{error}"),
                )
                .unwrap();
            assert!(ready);
            space.spool_up().unwrap();
            space.cleanup_render();

            let targets = [
                GfxTexture::new(&device, GfxTextureDesc::storage_2d(extent, vk::Format::B8G8R8A8_UNORM, "color")).unwrap(),
                GfxTexture::new(&device, GfxTextureDesc::storage_2d(extent, vk::Format::D32_SFLOAT, "depth")).unwrap(),
            ];
            headless.take_commands();

            Self {
                headless,
                space,
                targets,
            }
        }

        fn frame(&mut self, frame_index: usize) -> Vec<RecordedCommand> {
            let render_data = RenderData {
                render_target: self.targets[0].handle(),
                depth_stencil: self.targets[1].handle(),
                raster: RasterInfo::full(self.space.resolution()),
            };
            self.space.reset(frame_index);
            self.space.update(0.016).unwrap();
            self.space.render(&render_data).unwrap();
            self.space.cleanup_render();
            self.headless.take_commands()
        }

        fn quad_mesh(&mut self, material: usize) -> DrawableHandle {
            let mesh = self.space.create_mesh(material).unwrap();
            self.space.set_drawable_enabled(mesh, true);
            self.space.set_mesh_vertices(mesh, &[SpatialVertex::default(); 4]).unwrap();
            mesh
        }
    }

    fn builds(commands: &[RecordedCommand], ty: vk::AccelerationStructureTypeKHR) -> Vec<GfxAccelerationStructureBuild> {
        commands
            .iter()
            .filter_map(RecordedCommand::as_build)
            .filter(|build| build.inputs.ty == ty)
            .cloned()
            .collect()
    }

    #[test]
    fn test_single_opaque_mesh_frame() {
        let mut fixture = Fixture::new();
        let mesh = fixture.quad_mesh(SOLID);

        let commands = fixture.frame(0);
        let blas = builds(&commands, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);
        assert_eq!(blas.len(), 1);
        assert_eq!(blas[0].mode, vk::BuildAccelerationStructureModeKHR::BUILD);

        let tlas = builds(&commands, vk::AccelerationStructureTypeKHR::TOP_LEVEL);
        assert_eq!(tlas.len(), 1);
        let instances = fixture.headless.tlas_instances(&tlas[0]);
        assert_eq!(instances.len(), 1);

        let Some(active) = fixture.space.mesh(mesh).common().active_index() else {
            panic!("mesh is not active");
        };
        assert_eq!(instances[0].instance_id, active.0 as u32);
        assert_eq!(instances[0].hit_group_index, 0);
        assert_eq!(Some(instances[0].blas_address), fixture.space.mesh(mesh).blas_address());

        assert!(commands.iter().any(|command| matches!(command, RecordedCommand::DispatchRays { width: 8, height: 6, .. })));
        assert!(matches!(commands.last(), Some(RecordedCommand::Close)));
    }

    #[test]
    fn test_tlas_instances_face_counterclockwise() {
        let mut fixture = Fixture::new();
        fixture.quad_mesh(SOLID);

        let commands = fixture.frame(0);
        let tlas = builds(&commands, vk::AccelerationStructureTypeKHR::TOP_LEVEL);
        let instances = fixture.headless.tlas_instances(&tlas[0]);
        assert_eq!(instances.len(), 1);
        assert_eq!(
            instances[0].flags as u32,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FRONT_COUNTERCLOCKWISE.as_raw()
        );
        assert_eq!(instances[0].mask, fixture.space.material(SOLID).info().flags.bits());
    }

    #[test]
    fn test_swap_active_mesh_within_a_frame() {
        let mut fixture = Fixture::new();
        let first = fixture.quad_mesh(SOLID);
        fixture.frame(0);

        fixture.space.set_drawable_enabled(first, false);
        let second = fixture.quad_mesh(SOLID);
        let commands = fixture.frame(1);

        let tlas = builds(&commands, vk::AccelerationStructureTypeKHR::TOP_LEVEL);
        let instances = fixture.headless.tlas_instances(&tlas[0]);
        assert_eq!(instances.len(), 1);
        assert_eq!(Some(instances[0].blas_address), fixture.space.mesh(second).blas_address());

        let Some(pipeline) = &fixture.space.pipeline else {
            panic!("pipeline is not set up");
        };
        let refreshed = fixture
            .space
            .last_update_report()
            .refreshed
            .iter()
            .filter(|(list, _)| *list == pipeline.layout.mesh_instances)
            .map(|&(_, index)| index)
            .collect::<Vec<_>>();
        let Some(active) = fixture.space.mesh(second).common().active_index() else {
            panic!("second mesh is not active");
        };
        assert_eq!(refreshed, vec![active.0 as u32]);
        assert!(!fixture.space.last_update_report().resized);
    }

    #[test]
    fn test_growing_population_resizes_heap_once() {
        let mut fixture = Fixture::new();
        for _ in 0..3 {
            fixture.quad_mesh(SOLID);
        }
        fixture.frame(0);
        fixture.frame(1);
        assert!(!fixture.space.last_update_report().resized);

        for _ in 0..2 {
            fixture.quad_mesh(SOLID);
        }
        fixture.frame(0);
        assert!(fixture.space.last_update_report().resized);
        assert_eq!(fixture.space.meshes().active().count(), 5);

        fixture.frame(1);
        assert!(!fixture.space.last_update_report().resized);
    }

    #[test]
    fn test_animated_mesh_is_refit_on_second_frame() {
        let mut fixture = Fixture::new();
        let mesh = fixture.quad_mesh(WAVE);

        let first = fixture.frame(0);
        let first_blas = builds(&first, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);
        assert_eq!(first_blas.len(), 1);
        assert_eq!(first_blas[0].mode, vk::BuildAccelerationStructureModeKHR::BUILD);
        assert_eq!(fixture.space.animations()[0].thread_group_count(), 1);

        fixture
            .space
            .set_drawable_transform(mesh, glam::vec3(0.0, 1.0, 0.0), glam::Quat::IDENTITY);
        let second = fixture.frame(1);
        let second_blas = builds(&second, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);
        assert_eq!(second_blas.len(), 1);
        assert_eq!(second_blas[0].mode, vk::BuildAccelerationStructureModeKHR::UPDATE);
        assert_eq!(second_blas[0].src, Some(second_blas[0].dst));
        assert!(second.iter().any(|command| matches!(command, RecordedCommand::Dispatch { x: 1, y: 1, z: 1 })));
    }

    #[test]
    fn test_procedural_mesh_and_returned_drawable() {
        let mut fixture = Fixture::new();
        let orb = fixture.space.create_mesh(ORB).unwrap();
        fixture.space.set_drawable_enabled(orb, true);
        fixture.space.set_mesh_bounds(orb, &[SpatialBounds::default(); 3]).unwrap();
        let solid = fixture.quad_mesh(SOLID);

        let commands = fixture.frame(0);
        let tlas = builds(&commands, vk::AccelerationStructureTypeKHR::TOP_LEVEL);
        let mut hit_groups = fixture
            .headless
            .tlas_instances(&tlas[0])
            .iter()
            .map(|instance| instance.hit_group_index)
            .collect::<Vec<_>>();
        hit_groups.sort();
        assert_eq!(hit_groups, vec![0, 4]);

        fixture.space.return_drawable(solid);
        assert_eq!(fixture.space.drawable_count(), 1);
        assert_eq!(fixture.space.meshes().pool_size(), 1);
        let commands = fixture.frame(1);
        let tlas = builds(&commands, vk::AccelerationStructureTypeKHR::TOP_LEVEL);
        assert_eq!(fixture.headless.tlas_instances(&tlas[0]).len(), 1);
    }

    #[test]
    fn test_effect_is_drawn_with_its_selection() {
        let mut fixture = Fixture::new();
        let shader = |name: &str, stage| GfxShaderBlob {
            name: name.to_string(),
            stage,
            exports: vec!["Main".to_string()],
            code: Vec::new(),
        };
        let pipeline = fixture
            .space
            .create_raster_pipeline(
                &shader("Line.vs", GfxShaderStage::Vertex),
                &shader("Line.ps", GfxShaderStage::Pixel),
                "lines",
            )
            .unwrap();
        let effect = fixture.space.create_effect(pipeline).unwrap();
        fixture.space.set_drawable_enabled(effect, true);
        fixture
            .space
            .set_effect_vertices(effect, &[EffectVertex::default(); 6])
            .unwrap();

        let commands = fixture.frame(0);
        let draw = commands
            .iter()
            .position(|command| matches!(command, RecordedCommand::DrawInstanced { vertex_count: 6, .. }));
        let Some(draw) = draw else {
            panic!("effect was not drawn");
        };
        assert!(
            commands[..draw]
                .iter()
                .any(|command| matches!(command, RecordedCommand::SetRootDescriptorTable { .. }))
        );
        assert!(
            commands[..draw]
                .iter()
                .any(|command| matches!(command, RecordedCommand::SetRenderTargets { .. }))
        );
        assert_eq!(fixture.space.effects().pool_size(), 0);
    }

    #[test]
    fn test_compile_failure_aborts_setup() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let mut space = Space::new(&device, Rc::new(IdIssuer::new())).unwrap();
        space.perform_initial_setup_step_one().unwrap();

        let mut errors = Vec::new();
        let ready = space
            .perform_initial_setup_step_two(
                &description(),
                &EchoCompiler {
                    failing: Some("shaders/wave.hlsl"),
                },
                SpaceTextures::default(),
                &mut |error| errors.push(error.clone()),
            )
            .unwrap();
        assert!(!ready);
        assert_eq!(errors.len(), 1);
        assert!(space.shader_resources().is_none());
    }

    #[test]
    #[should_panic(expected = "material 7 does not exist")]
    fn test_unknown_material_panics() {
        let mut fixture = Fixture::new();
        let _ = fixture.space.create_mesh(7);
    }
}
