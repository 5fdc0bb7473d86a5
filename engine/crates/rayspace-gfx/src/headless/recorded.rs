use ash::vk;

use crate::commands::barrier::GfxResourceBarrier;
use crate::commands::command_list::GfxRootViewKind;
use crate::descriptors::descriptor_heap::GfxGpuDescriptorHandle;
use crate::raytracing::acceleration::GfxAccelerationStructureBuild;
use crate::resources::handles::{
    BufferHandle, DescriptorHeapHandle, PipelineHandle, ResourceHandle, RootSignatureHandle, TextureHandle,
};
use crate::resources::views::GfxVertexBufferView;

/// 被记录下来的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    Reset {
        frame_index: usize,
    },
    Close,
    BeginLabel(String),
    EndLabel,
    ResourceBarriers(Vec<GfxResourceBarrier>),
    CopyBufferRegion {
        dst: BufferHandle,
        dst_offset: vk::DeviceSize,
        src: BufferHandle,
        src_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    CopyResource {
        dst: ResourceHandle,
        src: ResourceHandle,
    },
    BuildAccelerationStructure(GfxAccelerationStructureBuild),
    DispatchRays {
        raygen: vk::DeviceAddress,
        width: u32,
        height: u32,
        depth: u32,
    },
    SetPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: PipelineHandle,
    },
    SetRootSignature {
        bind_point: vk::PipelineBindPoint,
        root_signature: RootSignatureHandle,
    },
    SetDescriptorHeap(DescriptorHeapHandle),
    SetRootConstant {
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        value: u32,
    },
    SetRootView {
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        kind: GfxRootViewKind,
        address: vk::DeviceAddress,
    },
    SetRootDescriptorTable {
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        handle: GfxGpuDescriptorHandle,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    SetRenderTargets {
        color: TextureHandle,
        depth: TextureHandle,
    },
    SetViewport {
        width: f32,
        height: f32,
    },
    SetVertexBuffer {
        slot: u32,
        view: GfxVertexBufferView,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
}
impl RecordedCommand {
    /// 加速结构构建命令
    #[inline]
    pub fn as_build(&self) -> Option<&GfxAccelerationStructureBuild> {
        match self {
            Self::BuildAccelerationStructure(build) => Some(build),
            _ => None,
        }
    }
}
