use std::rc::Rc;

use ash::vk;
use rayspace_gfx::commands::barrier::{GfxResourceBarrier, GfxResourceState};
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::raytracing::blas_generator::GfxBlasGenerator;
use rayspace_gfx::raytracing::in_buffer_allocator::GfxAddressableBuffer;
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::views::{GfxConstantBufferView, GfxShaderResourceView, GfxUnorderedAccessView};
use rayspace_utils::id_issuer::IdIssuer;

use crate::animation::AnimationHandle;
use crate::drawable::{
    ActiveChange, BlasContext, Drawable, DrawableCommon, DrawableKind, DrawableVariant, UploadContext,
};
use crate::gpu_data::{MeshDataBuffer, SpatialBounds, SpatialVertex};
use crate::material::{GeometryType, MaterialInfo};
use crate::shader_buffer::ShaderBuffer;

struct MeshBlas {
    generator: GfxBlasGenerator,
    result: GfxAddressableBuffer,
    scratch: GfxAddressableBuffer,
}

/// 参与光追的几何体
///
/// 三角形材质的几何是 quad 顶点，程序化材质的几何是包围盒。
/// 带动画的材质额外持有一份目标 buffer，由计算着色器每帧从源 buffer 写入，BLAS 以目标 buffer 构建并原地 refit。
pub struct Mesh {
    common: DrawableCommon,
    device: Rc<dyn GfxDevice>,

    material: Option<MaterialInfo>,
    instance_data: ShaderBuffer,

    geometry_source: Option<GfxBuffer>,
    geometry_destination: Option<GfxBuffer>,
    index_buffer: Option<(Rc<GfxBuffer>, u32)>,

    requires_fresh_blas: bool,
    blas: Option<MeshBlas>,

    animation_handle: Option<AnimationHandle>,
}
// new & init
impl Mesh {
    pub fn new(device: &Rc<dyn GfxDevice>, ids: &IdIssuer) -> GfxResult<Self> {
        let id = ids.issue();
        let instance_data = ShaderBuffer::with_data(
            device,
            &MeshDataBuffer::from_transform(&glam::Mat4::IDENTITY),
            format!("mesh {id} instance data"),
        )?;

        Ok(Self {
            common: DrawableCommon::new(id),
            device: device.clone(),
            material: None,
            instance_data,
            geometry_source: None,
            geometry_destination: None,
            index_buffer: None,
            requires_fresh_blas: false,
            blas: None,
            animation_handle: None,
        })
    }

    /// 从对象池取出后绑定材质
    pub fn initialize(&mut self, material: MaterialInfo) {
        assert!(self.material.is_none(), "mesh {} is already initialized", self.common.id());
        self.material = Some(material);
    }
}
// getter
impl Mesh {
    #[inline]
    pub fn material(&self) -> &MaterialInfo {
        match &self.material {
            Some(material) => material,
            None => panic!("mesh {} has no material", self.common.id()),
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.material.is_some()
    }

    #[inline]
    pub fn is_animated(&self) -> bool {
        self.material.is_some_and(|material| material.is_animated())
    }

    /// 三角形以 quad 为单位，程序化几何以包围盒为单位
    pub fn geometry_unit_count(&self) -> u32 {
        match self.material().geometry_type {
            GeometryType::Triangles => self.common.element_count() / 4,
            GeometryType::Procedural => self.common.element_count(),
        }
    }

    #[inline]
    pub fn instance_data_view(&self) -> GfxConstantBufferView {
        self.instance_data.descriptor()
    }

    #[inline]
    pub fn instance_data_address(&self) -> vk::DeviceAddress {
        self.instance_data.address()
    }

    /// 光追使用的几何：带动画时为目标 buffer
    pub fn geometry_buffer(&self) -> Option<&GfxBuffer> {
        if self.is_animated() {
            self.geometry_destination.as_ref()
        } else {
            self.geometry_source.as_ref()
        }
    }

    pub fn geometry_view(&self) -> Option<GfxShaderResourceView> {
        let buffer = self.geometry_buffer()?;
        Some(self.buffer_srv(buffer))
    }

    /// 动画计算着色器读取的源几何
    pub fn source_geometry_view(&self) -> Option<GfxShaderResourceView> {
        let buffer = self.geometry_source.as_ref()?;
        Some(self.buffer_srv(buffer))
    }

    /// 动画计算着色器写入的目标几何
    pub fn destination_geometry_view(&self) -> Option<GfxUnorderedAccessView> {
        let buffer = self.geometry_destination.as_ref()?;
        Some(GfxUnorderedAccessView::Buffer {
            buffer: buffer.handle(),
            first_element: 0,
            element_count: self.common.element_count(),
            stride: self.element_stride() as u32,
        })
    }

    #[inline]
    pub fn geometry_destination(&self) -> Option<&GfxBuffer> {
        self.geometry_destination.as_ref()
    }

    #[inline]
    pub fn index_buffer(&self) -> Option<(&GfxBuffer, u32)> {
        self.index_buffer.as_ref().map(|(buffer, count)| (buffer.as_ref(), *count))
    }

    #[inline]
    pub fn requires_fresh_blas(&self) -> bool {
        self.requires_fresh_blas
    }

    #[inline]
    pub fn blas_address(&self) -> Option<vk::DeviceAddress> {
        self.blas.as_ref().map(|blas| blas.result.address())
    }

    #[inline]
    pub fn animation_handle(&self) -> Option<AnimationHandle> {
        self.animation_handle
    }

    fn element_stride(&self) -> u64 {
        match self.material().geometry_type {
            GeometryType::Triangles => size_of::<SpatialVertex>() as u64,
            GeometryType::Procedural => size_of::<SpatialBounds>() as u64,
        }
    }

    fn buffer_srv(&self, buffer: &GfxBuffer) -> GfxShaderResourceView {
        GfxShaderResourceView::Buffer {
            buffer: buffer.handle(),
            first_element: 0,
            element_count: self.common.element_count(),
            stride: self.element_stride() as u32,
        }
    }
}
// update
impl Mesh {
    /// 替换三角形几何，顶点数必须是 4 的倍数
    pub fn set_new_vertices(&mut self, vertices: &[SpatialVertex]) -> GfxResult<ActiveChange> {
        assert_eq!(
            self.material().geometry_type,
            GeometryType::Triangles,
            "mesh {} expects bounds, not vertices",
            self.common.id()
        );
        assert!(
            vertices.len() % 4 == 0,
            "mesh {} got {} vertices, not a multiple of four",
            self.common.id(),
            vertices.len()
        );
        self.set_new_elements(vertices.len() as u32, bytemuck::cast_slice(vertices))
    }

    /// 替换程序化几何
    pub fn set_new_bounds(&mut self, bounds: &[SpatialBounds]) -> GfxResult<ActiveChange> {
        assert_eq!(
            self.material().geometry_type,
            GeometryType::Procedural,
            "mesh {} expects vertices, not bounds",
            self.common.id()
        );
        self.set_new_elements(bounds.len() as u32, bytemuck::cast_slice(bounds))
    }

    /// 变换改变时刷新实例常量
    pub fn update(&mut self) -> GfxResult<()> {
        if self.common.clear_transform_dirty() {
            self.instance_data
                .write(&MeshDataBuffer::from_transform(&self.common.transform()))?;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn set_animation_handle(&mut self, handle: Option<AnimationHandle>) {
        self.animation_handle = handle;
    }

    /// 构建或 refit BLAS
    ///
    /// `for_animation` 为 true 时来自动画控制器：需要全新构建的 mesh 会在之后的常规流程中处理，这里跳过。
    pub fn create_blas(&mut self, ctx: &mut BlasContext<'_>, for_animation: bool) -> GfxResult<()> {
        let _span = tracy_client::span!("Mesh::create_blas");

        if for_animation && self.requires_fresh_blas {
            return Ok(());
        }

        let id = self.common.id();
        let count = self.common.element_count();
        if count == 0 {
            self.blas = None;
            self.requires_fresh_blas = false;
            return Ok(());
        }

        let material = *self.material();
        if self.requires_fresh_blas {
            let Some(geometry) = self.geometry_buffer().map(|buffer| buffer.device_address()) else {
                panic!("mesh {id} builds a BLAS before its data upload");
            };

            let mut generator = GfxBlasGenerator::new();
            match material.geometry_type {
                GeometryType::Triangles => {
                    let Some((index_buffer, index_count)) = &self.index_buffer else {
                        panic!("mesh {id} builds a BLAS without an index buffer");
                    };
                    generator.add_vertex_buffer(
                        geometry,
                        count,
                        size_of::<SpatialVertex>() as u64,
                        Some((index_buffer.device_address(), *index_count)),
                        None,
                        material.opaque,
                    );
                }
                GeometryType::Procedural => {
                    generator.add_bounds_buffer(geometry, count, size_of::<SpatialBounds>() as u64);
                }
            }

            let (scratch_size, result_size) = generator.compute_as_buffer_sizes(ctx.device, material.is_animated());
            let result = ctx.result_allocator.allocate(result_size)?;
            let scratch = ctx.scratch_allocator.allocate(scratch_size)?;
            generator.generate(ctx.cmd, scratch.address(), result.address(), false, None);
            log::debug!("mesh {id} builds a fresh BLAS ({result_size} bytes)");

            self.blas = Some(MeshBlas {
                generator,
                result,
                scratch,
            });
            self.requires_fresh_blas = false;
        } else {
            assert!(
                material.is_animated(),
                "mesh {id} requests a BLAS refit but its material does not allow updates"
            );
            let Some(blas) = &self.blas else {
                panic!("mesh {id} requests a BLAS refit before its first build");
            };
            blas.generator.generate(
                ctx.cmd,
                blas.scratch.address(),
                blas.result.address(),
                true,
                Some(blas.result.address()),
            );
        }

        if let Some(resource) = self.blas.as_ref().and_then(|blas| blas.result.resource()) {
            ctx.uavs.push(resource);
        }
        Ok(())
    }
}
// tools
impl Mesh {
    fn set_new_elements(&mut self, count: u32, data: &[u8]) -> GfxResult<ActiveChange> {
        let change = self.common.handle_modification(count);
        if count > 0 {
            let name = format!("mesh {} upload", self.common.id());
            self.common.stage_upload(&self.device, data, name)?;
        }
        Ok(change)
    }
}

impl DrawableVariant for Mesh {
    const KIND: DrawableKind = DrawableKind::Mesh;

    #[inline]
    fn wrap(self) -> Drawable {
        Drawable::Mesh(self)
    }

    #[inline]
    fn from_drawable(drawable: &Drawable) -> Option<&Self> {
        match drawable {
            Drawable::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    #[inline]
    fn from_drawable_mut(drawable: &mut Drawable) -> Option<&mut Self> {
        match drawable {
            Drawable::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    #[inline]
    fn common(&self) -> &DrawableCommon {
        &self.common
    }

    #[inline]
    fn common_mut(&mut self) -> &mut DrawableCommon {
        &mut self.common
    }

    fn do_data_upload(&mut self, ctx: &mut UploadContext<'_>) -> GfxResult<()> {
        let id = self.common.id();
        let count = self.common.element_count();
        let material = *self.material();
        let size = count as u64 * self.element_stride();

        let Some(upload) = self.common.upload_buffer() else {
            panic!("mesh {id} has no staged data to upload");
        };

        let source = GfxBuffer::new_device_local(
            ctx.device,
            size,
            GfxResourceState::COPY_DEST,
            format!("mesh {id} geometry"),
        )?;

        self.geometry_destination = None;
        if material.is_animated() {
            // 未激活的 mesh 不会被动画写入，目标 buffer 直接拷贝一份源数据
            let active = self.common.is_active();
            let initial_state = if active {
                GfxResourceState::NON_PIXEL_SHADER_RESOURCE
            } else {
                GfxResourceState::COPY_DEST
            };
            let destination =
                GfxBuffer::new_device_local(ctx.device, size, initial_state, format!("mesh {id} animated geometry"))?;
            if !active {
                ctx.cmd.copy_buffer_region(destination.handle(), 0, upload.handle(), 0, size);
                ctx.barriers.push(GfxResourceBarrier::transition(
                    destination.handle(),
                    GfxResourceState::COPY_DEST,
                    GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
                ));
            }
            self.geometry_destination = Some(destination);
        }

        ctx.cmd.copy_buffer_region(source.handle(), 0, upload.handle(), 0, size);
        ctx.barriers.push(GfxResourceBarrier::transition(
            source.handle(),
            GfxResourceState::COPY_DEST,
            GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
        ));
        self.geometry_source = Some(source);

        self.index_buffer = match material.geometry_type {
            GeometryType::Triangles => Some(ctx.index_buffer.get_index_buffer(ctx.cmd, count, &mut ctx.barriers)?),
            GeometryType::Procedural => None,
        };

        self.requires_fresh_blas = true;
        Ok(())
    }

    fn do_reset(&mut self) {
        self.material = None;
        self.geometry_source = None;
        self.geometry_destination = None;
        self.index_buffer = None;
        self.requires_fresh_blas = false;
        self.blas = None;
        self.animation_handle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialFlags;
    use crate::shared_index_buffer::SharedIndexBuffer;
    use rayspace_gfx::commands::command_list::GfxCommandList;
    use rayspace_gfx::headless::{HeadlessDevice, RecordedCommand};
    use rayspace_gfx::raytracing::in_buffer_allocator::GfxInBufferAllocator;

    fn material(geometry_type: GeometryType, animation: Option<usize>) -> MaterialInfo {
        MaterialInfo {
            index: 0,
            hit_group_index: 0,
            geometry_type,
            opaque: true,
            flags: MaterialFlags::VISIBLE | MaterialFlags::SHADOW_CASTER,
            animation,
        }
    }

    fn quad() -> Vec<SpatialVertex> {
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]
            .into_iter()
            .map(|position| SpatialVertex { position, data: 0 })
            .collect()
    }

    struct Fixture {
        headless: Rc<HeadlessDevice>,
        device: Rc<dyn GfxDevice>,
        cmd: Box<dyn GfxCommandList>,
        index_buffer: SharedIndexBuffer,
    }
    impl Fixture {
        fn new() -> Self {
            let headless = Rc::new(HeadlessDevice::new());
            let device: Rc<dyn GfxDevice> = headless.clone();
            let mut cmd = device.create_command_list(1, "cmd").unwrap();
            cmd.reset(0);
            let index_buffer = SharedIndexBuffer::new(&device);
            Self {
                headless,
                device,
                cmd,
                index_buffer,
            }
        }

        fn upload(&mut self, mesh: &mut Mesh) -> Vec<GfxResourceBarrier> {
            let mut ctx = UploadContext {
                device: &self.device,
                cmd: self.cmd.as_mut(),
                index_buffer: &mut self.index_buffer,
                barriers: Vec::new(),
            };
            mesh.enqueue_data_upload(&mut ctx).unwrap();
            ctx.barriers
        }
    }

    #[test]
    fn test_triangle_upload_records_copy_and_index_buffer() {
        let mut fixture = Fixture::new();
        let mut mesh = Mesh::new(&fixture.device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Triangles, None));
        mesh.set_new_vertices(&quad()).unwrap();

        let barriers = fixture.upload(&mut mesh);
        // 几何与共享索引各一个
        assert_eq!(barriers.len(), 2);
        assert!(mesh.requires_fresh_blas());
        assert_eq!(mesh.index_buffer().map(|(_, count)| count), Some(6));
        assert!(mesh.geometry_view().is_some());
        assert!(mesh.destination_geometry_view().is_none());

        let copies = fixture
            .headless
            .take_commands()
            .into_iter()
            .filter(|command| matches!(command, RecordedCommand::CopyBufferRegion { .. }))
            .count();
        assert_eq!(copies, 2);
    }

    #[test]
    fn test_inactive_animated_mesh_copies_into_destination() {
        let mut fixture = Fixture::new();
        let mut mesh = Mesh::new(&fixture.device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Procedural, Some(0)));
        let bounds = vec![SpatialBounds::default(); 3];
        mesh.set_new_bounds(&bounds).unwrap();

        let barriers = fixture.upload(&mut mesh);
        assert_eq!(barriers.len(), 2);
        assert!(mesh.index_buffer().is_none());

        let destination = mesh.geometry_destination().unwrap().handle();
        assert!(matches!(
            mesh.geometry_view(),
            Some(GfxShaderResourceView::Buffer { buffer, element_count: 3, stride: 40, .. }) if buffer == destination
        ));
    }

    #[test]
    fn test_fresh_build_then_refit() {
        let mut fixture = Fixture::new();
        let mut mesh = Mesh::new(&fixture.device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Procedural, Some(0)));
        mesh.set_new_bounds(&[SpatialBounds::default()]).unwrap();
        fixture.upload(&mut mesh);
        fixture.headless.take_commands();

        let results = GfxInBufferAllocator::new(
            &fixture.device,
            GfxResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
            "results",
        );
        let scratch = GfxInBufferAllocator::new(&fixture.device, GfxResourceState::UNORDERED_ACCESS, "scratch");
        let mut ctx = BlasContext {
            device: fixture.device.as_ref(),
            cmd: fixture.cmd.as_mut(),
            result_allocator: &results,
            scratch_allocator: &scratch,
            uavs: Vec::new(),
        };

        // 动画阶段跳过尚未首次构建的 mesh
        mesh.create_blas(&mut ctx, true).unwrap();
        assert!(mesh.blas_address().is_none());

        mesh.create_blas(&mut ctx, false).unwrap();
        let address = mesh.blas_address().unwrap();
        mesh.create_blas(&mut ctx, true).unwrap();
        assert_eq!(mesh.blas_address(), Some(address));

        let modes: Vec<_> = fixture
            .headless
            .take_commands()
            .iter()
            .filter_map(|command| command.as_build().map(|build| (build.mode, build.src)))
            .collect();
        assert_eq!(
            modes,
            vec![
                (vk::BuildAccelerationStructureModeKHR::BUILD, None),
                (vk::BuildAccelerationStructureModeKHR::UPDATE, Some(address)),
            ]
        );
    }

    fn allocators(device: &Rc<dyn GfxDevice>) -> (GfxInBufferAllocator, GfxInBufferAllocator) {
        (
            GfxInBufferAllocator::new(device, GfxResourceState::RAYTRACING_ACCELERATION_STRUCTURE, "results"),
            GfxInBufferAllocator::new(device, GfxResourceState::UNORDERED_ACCESS, "scratch"),
        )
    }

    #[test]
    #[should_panic(expected = "does not allow updates")]
    fn test_refit_of_static_mesh_panics() {
        let mut fixture = Fixture::new();
        let mut mesh = Mesh::new(&fixture.device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Triangles, None));
        mesh.set_new_vertices(&quad()).unwrap();
        fixture.upload(&mut mesh);

        let (results, scratch) = allocators(&fixture.device);
        let mut ctx = BlasContext {
            device: fixture.device.as_ref(),
            cmd: fixture.cmd.as_mut(),
            result_allocator: &results,
            scratch_allocator: &scratch,
            uavs: Vec::new(),
        };
        mesh.create_blas(&mut ctx, false).unwrap();
        assert!(mesh.blas_address().is_some());

        let _ = mesh.create_blas(&mut ctx, true);
    }

    #[test]
    #[should_panic(expected = "before its first build")]
    fn test_refit_before_first_build_panics() {
        let mut fixture = Fixture::new();
        let mut mesh = Mesh::new(&fixture.device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Procedural, Some(0)));
        // 数据尚未上传，也就没有全新构建的请求
        mesh.set_new_bounds(&[SpatialBounds::default()]).unwrap();
        assert!(!mesh.requires_fresh_blas());

        let (results, scratch) = allocators(&fixture.device);
        let mut ctx = BlasContext {
            device: fixture.device.as_ref(),
            cmd: fixture.cmd.as_mut(),
            result_allocator: &results,
            scratch_allocator: &scratch,
            uavs: Vec::new(),
        };
        let _ = mesh.create_blas(&mut ctx, true);
    }

    #[test]
    #[should_panic(expected = "not a multiple of four")]
    fn test_partial_quad_panics() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let mut mesh = Mesh::new(&device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Triangles, None));
        let _ = mesh.set_new_vertices(&quad()[..3]);
    }

    #[test]
    #[should_panic(expected = "expects vertices")]
    fn test_bounds_on_triangle_material_panics() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let mut mesh = Mesh::new(&device, &IdIssuer::new()).unwrap();
        mesh.initialize(material(GeometryType::Triangles, None));
        let _ = mesh.set_new_bounds(&[SpatialBounds::default()]);
    }
}
