//! 计算着色器驱动的 mesh 动画
//!
//! 每个动画控制器对应一个计算着色器，负责所有使用该动画的激活 mesh。
//! 着色器从源几何读取、向目标几何写入，之后 BLAS 在目标几何上原地 refit。

use std::rc::Rc;

use ash::vk;
use rayspace_gfx::commands::barrier::{GfxResourceBarrier, GfxResourceState};
use rayspace_gfx::commands::command_list::GfxCommandList;
use rayspace_gfx::descriptors::root_signature::GfxShaderLocation;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::pipelines::pipeline_desc::GfxComputePipelineDesc;
use rayspace_gfx::pipelines::shader::GfxShaderBlob;
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::handles::{PipelineHandle, RootSignatureHandle};
use rayspace_gfx::resources::views::{GfxShaderResourceView, GfxViewDescriptor};
use rayspace_render_interface::shader_resources::{Description, ListHandle, ShaderResources, TableEntry};
use rayspace_utils::bag::Bag;
use rayspace_utils::integer_set::IntegerSet;

use crate::drawable::{BlasContext, DrawableArena, DrawableHandle, DrawableVariant, Mesh};
use crate::drawables_group::{variant, variant_mut};
use crate::gpu_data::{AnimationSubmission, AnimationThreadGroup};

rayspace_utils::new_stable_index! {
    /// mesh 在所属动画控制器中的位置，也是几何列表的索引
    pub struct AnimationHandle;
}

/// 第一个动画控制器使用的寄存器空间
const FIRST_ANIMATION_SPACE: u32 = 3;

#[derive(Copy, Clone, Debug)]
struct AnimationLayout {
    thread_group_entry: TableEntry,
    source_list: ListHandle,
    destination_list: ListHandle,
}

pub struct AnimationController {
    index: usize,
    device: Rc<dyn GfxDevice>,

    shader: GfxShaderBlob,
    pipeline: Option<PipelineHandle>,
    layout: Option<AnimationLayout>,

    meshes: Bag<DrawableHandle, AnimationHandle>,
    changed: IntegerSet<AnimationHandle>,
    removed: IntegerSet<AnimationHandle>,

    thread_groups: Vec<AnimationThreadGroup>,
    thread_group_buffer: Option<GfxBuffer>,
    thread_group_upload: Option<GfxBuffer>,
    /// buffer 能容纳的线程组数
    thread_group_capacity: usize,
}
// new & init
impl AnimationController {
    /// `index` 决定资源所在的寄存器空间
    pub fn new(device: &Rc<dyn GfxDevice>, shader: GfxShaderBlob, index: usize) -> Self {
        Self {
            index,
            device: device.clone(),
            shader,
            pipeline: None,
            layout: None,
            meshes: Bag::new(),
            changed: IntegerSet::new(),
            removed: IntegerSet::new(),
            thread_groups: Vec::new(),
            thread_group_buffer: None,
            thread_group_upload: None,
            thread_group_capacity: 0,
        }
    }

    /// 在计算根签名中登记：线程组数据表 (t0)、源几何列表 (t1)、目标几何列表 (u0)
    pub fn set_up_resource_layout(&mut self, description: &mut Description) {
        let space = FIRST_ANIMATION_SPACE + self.index as u32;

        let mut thread_group_entry = None;
        description.add_heap_descriptor_table(|table| {
            thread_group_entry = Some(table.add_shader_resource_view(GfxShaderLocation::new(0, space), 1));
        });
        let Some(thread_group_entry) = thread_group_entry else {
            panic!("animation {} table has no thread group entry", self.index);
        };

        let source_list = description.add_shader_resource_view_descriptor_list(GfxShaderLocation::new(1, space));
        let destination_list =
            description.add_unordered_access_view_descriptor_list(GfxShaderLocation::new(0, space));

        self.layout = Some(AnimationLayout {
            thread_group_entry,
            source_list,
            destination_list,
        });
    }

    pub fn initialize(&mut self, root_signature: RootSignatureHandle) -> GfxResult<()> {
        let pipeline = self.device.create_compute_pipeline(&GfxComputePipelineDesc {
            shader: &self.shader,
            root_signature,
            name: format!("animation-{}", self.index),
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }
}
// getter
impl AnimationController {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn shader(&self) -> &GfxShaderBlob {
        &self.shader
    }

    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.count()
    }

    #[inline]
    pub fn thread_group_count(&self) -> usize {
        self.thread_groups.len()
    }

    #[inline]
    pub fn thread_groups(&self) -> &[AnimationThreadGroup] {
        &self.thread_groups
    }

    #[inline]
    pub fn source_list(&self) -> ListHandle {
        self.layout().source_list
    }

    #[inline]
    pub fn destination_list(&self) -> ListHandle {
        self.layout().destination_list
    }

    fn layout(&self) -> &AnimationLayout {
        match &self.layout {
            Some(layout) => layout,
            None => panic!("animation {} has no resource layout", self.index),
        }
    }
}
// 描述符列表
impl AnimationController {
    #[inline]
    pub fn owns_list(&self, list: ListHandle) -> bool {
        self.layout
            .is_some_and(|layout| layout.source_list == list || layout.destination_list == list)
    }

    /// 两个几何列表的长度相同
    #[inline]
    pub fn list_size(&self) -> u32 {
        self.meshes.capacity() as u32
    }

    pub fn list_descriptor(&self, objects: &DrawableArena, list: ListHandle, index: u32) -> Option<GfxViewDescriptor> {
        let handle = *self.meshes.get(AnimationHandle(index as usize))?;
        let mesh = variant::<Mesh>(objects, handle);
        if list == self.layout().source_list {
            mesh.source_geometry_view().map(Into::into)
        } else {
            mesh.destination_geometry_view().map(Into::into)
        }
    }

    pub fn for_each_list_index(&self, f: &mut dyn FnMut(u32)) {
        for handle in self.meshes.indices() {
            f(handle.0 as u32);
        }
    }
}
// update
impl AnimationController {
    pub fn add_mesh(&mut self, handle: DrawableHandle, mesh: &mut Mesh) {
        assert!(mesh.is_animated(), "mesh {} is not animated", mesh.common().id());
        assert!(
            mesh.animation_handle().is_none(),
            "mesh {} already belongs to an animation",
            mesh.common().id()
        );

        let animation_handle = self.meshes.push(handle);
        mesh.set_animation_handle(Some(animation_handle));
        self.changed.insert(animation_handle);
        self.removed.erase(animation_handle);
    }

    pub fn update_mesh(&mut self, mesh: &Mesh) {
        let Some(animation_handle) = mesh.animation_handle() else {
            panic!("mesh {} does not belong to an animation", mesh.common().id());
        };
        self.changed.insert(animation_handle);
    }

    pub fn remove_mesh(&mut self, mesh: &mut Mesh) {
        let Some(animation_handle) = mesh.animation_handle() else {
            panic!("mesh {} does not belong to an animation", mesh.common().id());
        };
        mesh.set_animation_handle(None);
        self.meshes.pop(animation_handle);
        self.changed.erase(animation_handle);
        self.removed.insert(animation_handle);
    }

    /// 刷新几何列表，成员有变化时重建并上传线程组数据
    pub fn update(
        &mut self,
        resources: &mut ShaderResources,
        objects: &DrawableArena,
        cmd: &mut dyn GfxCommandList,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("AnimationController::update");
        let layout = *self.layout();

        resources.request_list_refresh(layout.source_list, &self.changed);
        resources.request_list_refresh(layout.destination_list, &self.changed);

        if !self.changed.is_empty() || !self.removed.is_empty() {
            self.rebuild_thread_groups(objects);
            self.upload_thread_groups(resources, layout.thread_group_entry, cmd)?;
        }

        self.changed.clear();
        self.removed.clear();
        Ok(())
    }

    /// 录制一次计算着色器调度，需要先绑定计算根签名
    pub fn run(&self, objects: &DrawableArena, cmd: &mut dyn GfxCommandList) {
        if self.thread_groups.is_empty() {
            return;
        }
        let Some(pipeline) = self.pipeline else {
            panic!("animation {} runs before initialization", self.index);
        };

        let barriers = self
            .meshes
            .values()
            .map(|&handle| {
                let mesh = variant::<Mesh>(objects, handle);
                let Some(destination) = mesh.geometry_destination() else {
                    panic!("animated mesh {} has no destination geometry", mesh.common().id());
                };
                GfxResourceBarrier::transition(
                    destination.handle(),
                    GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
                    GfxResourceState::UNORDERED_ACCESS,
                )
            })
            .collect::<Vec<_>>();

        cmd.begin_label(&format!("animation-{}", self.index));
        cmd.resource_barriers(&barriers);
        cmd.set_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline);
        cmd.dispatch(self.thread_groups.len() as u32, 1, 1);
        let restore = barriers.into_iter().map(GfxResourceBarrier::reversed).collect::<Vec<_>>();
        cmd.resource_barriers(&restore);
        cmd.end_label();
    }

    /// 动画完成后为每个 mesh 构建或 refit BLAS
    pub fn create_blas(&self, objects: &mut DrawableArena, ctx: &mut BlasContext<'_>) -> GfxResult<()> {
        for &handle in self.meshes.values() {
            variant_mut::<Mesh>(objects, handle).create_blas(ctx, true)?;
        }
        Ok(())
    }
}
// tools
impl AnimationController {
    fn rebuild_thread_groups(&mut self, objects: &DrawableArena) {
        const PER_GROUP: usize = AnimationThreadGroup::SUBMISSIONS_PER_GROUP;
        const PER_SUBMISSION: u32 = AnimationThreadGroup::ELEMENTS_PER_SUBMISSION;

        self.thread_groups.clear();
        let mut next_submission = PER_GROUP;

        for (animation_handle, &handle) in self.meshes.iter() {
            let mesh = variant::<Mesh>(objects, handle);
            let Some(active) = mesh.common().active_index() else {
                panic!("animated mesh {} is not active", mesh.common().id());
            };
            let unit_count = mesh.geometry_unit_count();

            for offset in (0..unit_count).step_by(PER_SUBMISSION as usize) {
                if next_submission == PER_GROUP {
                    self.thread_groups.push(AnimationThreadGroup::default());
                    next_submission = 0;
                }
                let group = self.thread_groups.len() - 1;
                self.thread_groups[group].submissions[next_submission] = AnimationSubmission {
                    mesh_index: animation_handle.0 as u32,
                    instance_index: active.0 as u32,
                    offset,
                    count: (unit_count - offset).min(PER_SUBMISSION),
                };
                next_submission += 1;
            }
        }
    }

    fn upload_thread_groups(
        &mut self,
        resources: &mut ShaderResources,
        entry: TableEntry,
        cmd: &mut dyn GfxCommandList,
    ) -> GfxResult<()> {
        let count = self.thread_groups.len();
        if count == 0 {
            return Ok(());
        }
        let stride = size_of::<AnimationThreadGroup>();
        let size = (count * stride) as u64;

        let grow = self.thread_group_capacity < count;
        if grow {
            log::debug!(
                "animation {} thread group buffer grows {} -> {count}",
                self.index,
                self.thread_group_capacity
            );
            let buffer = GfxBuffer::new_device_local(
                &self.device,
                size,
                GfxResourceState::COPY_DEST,
                format!("animation-{}-thread-groups", self.index),
            )?;
            let upload =
                GfxBuffer::new_upload(&self.device, size, format!("animation-{}-thread-groups-upload", self.index))?;
            resources.create_shader_resource_view(
                entry,
                0,
                GfxShaderResourceView::Buffer {
                    buffer: buffer.handle(),
                    first_element: 0,
                    element_count: count as u32,
                    stride: stride as u32,
                },
            );

            self.thread_group_buffer = Some(buffer);
            self.thread_group_upload = Some(upload);
            self.thread_group_capacity = count;
        }

        let (Some(buffer), Some(upload)) = (&self.thread_group_buffer, &self.thread_group_upload) else {
            panic!("animation {} has no thread group buffer", self.index);
        };
        if !grow {
            cmd.resource_barriers(&[GfxResourceBarrier::transition(
                buffer.handle(),
                GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
                GfxResourceState::COPY_DEST,
            )]);
        }

        upload.write_bytes(0, bytemuck::cast_slice(&self.thread_groups))?;
        cmd.copy_buffer_region(buffer.handle(), 0, upload.handle(), 0, size);
        cmd.resource_barriers(&[GfxResourceBarrier::transition(
            buffer.handle(),
            GfxResourceState::COPY_DEST,
            GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
        )]);
        Ok(())
    }
}
