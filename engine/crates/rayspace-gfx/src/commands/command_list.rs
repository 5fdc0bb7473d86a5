use ash::vk;

use crate::commands::barrier::GfxResourceBarrier;
use crate::descriptors::descriptor_heap::GfxGpuDescriptorHandle;
use crate::error::GfxResult;
use crate::raytracing::acceleration::GfxAccelerationStructureBuild;
use crate::resources::handles::{BufferHandle, DescriptorHeapHandle, PipelineHandle, ResourceHandle, RootSignatureHandle, TextureHandle};
use crate::resources::views::GfxVertexBufferView;

/// 根参数中直接绑定的视图类型
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxRootViewKind {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
}

/// `dispatch_rays` 的参数
#[derive(Copy, Clone, Debug, Default)]
pub struct GfxDispatchRaysDesc {
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// 一帧的命令录制
///
/// 每个 frame in flight 持有一份录制资源，[`Self::reset`] 切换到对应的那一份。
/// 录制出的命令由外部提交，等待完成也由外部负责。
pub trait GfxCommandList {
    // basic
    fn reset(&mut self, frame_index: usize);
    fn close(&mut self) -> GfxResult<()>;
    fn begin_label(&mut self, label: &str);
    fn end_label(&mut self);

    // 同步与拷贝
    fn resource_barriers(&mut self, barriers: &[GfxResourceBarrier]);
    fn copy_buffer_region(
        &mut self,
        dst: BufferHandle,
        dst_offset: vk::DeviceSize,
        src: BufferHandle,
        src_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    );
    fn copy_resource(&mut self, dst: ResourceHandle, src: ResourceHandle);

    // 光追
    fn build_acceleration_structure(&mut self, build: &GfxAccelerationStructureBuild);
    fn dispatch_rays(&mut self, desc: &GfxDispatchRaysDesc);

    // 绑定
    fn set_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: PipelineHandle);
    fn set_root_signature(&mut self, bind_point: vk::PipelineBindPoint, root_signature: RootSignatureHandle);
    fn set_descriptor_heap(&mut self, heap: DescriptorHeapHandle);
    fn set_root_constant(&mut self, bind_point: vk::PipelineBindPoint, parameter: u32, value: u32);
    fn set_root_view(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        kind: GfxRootViewKind,
        address: vk::DeviceAddress,
    );
    fn set_root_descriptor_table(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        handle: GfxGpuDescriptorHandle,
    );

    // 计算
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    // 光栅
    fn set_render_targets(&mut self, color: TextureHandle, depth: TextureHandle);
    fn set_viewport(&mut self, viewport: vk::Viewport, scissor: vk::Rect2D);
    fn set_vertex_buffer(&mut self, slot: u32, view: GfxVertexBufferView);
    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
}
