use std::cell::RefCell;
use std::rc::Rc;

use ash::vk;

use crate::commands::barrier::GfxResourceBarrier;
use crate::commands::command_list::{GfxCommandList, GfxDispatchRaysDesc, GfxRootViewKind};
use crate::descriptors::descriptor_heap::GfxGpuDescriptorHandle;
use crate::error::GfxResult;
use crate::headless::recorded::RecordedCommand;
use crate::raytracing::acceleration::GfxAccelerationStructureBuild;
use crate::resources::handles::{
    BufferHandle, DescriptorHeapHandle, PipelineHandle, ResourceHandle, RootSignatureHandle, TextureHandle,
};
use crate::resources::views::GfxVertexBufferView;

/// 把命令追加到设备共享的记录中
pub struct HeadlessCommandList {
    log: Rc<RefCell<Vec<RecordedCommand>>>,
    frames_in_flight: usize,
    recording: bool,

    name: String,
}
impl HeadlessCommandList {
    pub(crate) fn new(log: Rc<RefCell<Vec<RecordedCommand>>>, frames_in_flight: usize, name: &str) -> Self {
        Self {
            log,
            frames_in_flight,
            recording: false,
            name: name.to_string(),
        }
    }

    fn record(&mut self, command: RecordedCommand) {
        assert!(self.recording, "command list '{}' is not open, call reset first", self.name);
        self.log.borrow_mut().push(command);
    }
}
impl GfxCommandList for HeadlessCommandList {
    fn reset(&mut self, frame_index: usize) {
        assert!(
            frame_index < self.frames_in_flight,
            "frame index {frame_index} out of range for '{}' ({} frames in flight)",
            self.name,
            self.frames_in_flight
        );
        self.recording = true;
        self.record(RecordedCommand::Reset { frame_index });
    }

    fn close(&mut self) -> GfxResult<()> {
        self.record(RecordedCommand::Close);
        self.recording = false;
        Ok(())
    }

    fn begin_label(&mut self, label: &str) {
        self.record(RecordedCommand::BeginLabel(label.to_string()));
    }

    fn end_label(&mut self) {
        self.record(RecordedCommand::EndLabel);
    }

    fn resource_barriers(&mut self, barriers: &[GfxResourceBarrier]) {
        assert!(
            barriers.iter().all(|barrier| barrier.target().is_some()),
            "resource barrier without a target resource"
        );
        self.record(RecordedCommand::ResourceBarriers(barriers.to_vec()));
    }

    fn copy_buffer_region(
        &mut self,
        dst: BufferHandle,
        dst_offset: vk::DeviceSize,
        src: BufferHandle,
        src_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) {
        self.record(RecordedCommand::CopyBufferRegion {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        });
    }

    fn copy_resource(&mut self, dst: ResourceHandle, src: ResourceHandle) {
        self.record(RecordedCommand::CopyResource { dst, src });
    }

    fn build_acceleration_structure(&mut self, build: &GfxAccelerationStructureBuild) {
        self.record(RecordedCommand::BuildAccelerationStructure(build.clone()));
    }

    fn dispatch_rays(&mut self, desc: &GfxDispatchRaysDesc) {
        self.record(RecordedCommand::DispatchRays {
            raygen: desc.raygen.device_address,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
        });
    }

    fn set_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: PipelineHandle) {
        self.record(RecordedCommand::SetPipeline { bind_point, pipeline });
    }

    fn set_root_signature(&mut self, bind_point: vk::PipelineBindPoint, root_signature: RootSignatureHandle) {
        self.record(RecordedCommand::SetRootSignature {
            bind_point,
            root_signature,
        });
    }

    fn set_descriptor_heap(&mut self, heap: DescriptorHeapHandle) {
        self.record(RecordedCommand::SetDescriptorHeap(heap));
    }

    fn set_root_constant(&mut self, bind_point: vk::PipelineBindPoint, parameter: u32, value: u32) {
        self.record(RecordedCommand::SetRootConstant {
            bind_point,
            parameter,
            value,
        });
    }

    fn set_root_view(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        kind: GfxRootViewKind,
        address: vk::DeviceAddress,
    ) {
        self.record(RecordedCommand::SetRootView {
            bind_point,
            parameter,
            kind,
            address,
        });
    }

    fn set_root_descriptor_table(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        parameter: u32,
        handle: GfxGpuDescriptorHandle,
    ) {
        self.record(RecordedCommand::SetRootDescriptorTable {
            bind_point,
            parameter,
            handle,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(RecordedCommand::Dispatch { x, y, z });
    }

    fn set_render_targets(&mut self, color: TextureHandle, depth: TextureHandle) {
        self.record(RecordedCommand::SetRenderTargets { color, depth });
    }

    fn set_viewport(&mut self, viewport: vk::Viewport, _scissor: vk::Rect2D) {
        self.record(RecordedCommand::SetViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, view: GfxVertexBufferView) {
        self.record(RecordedCommand::SetVertexBuffer { slot, view });
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.record(RecordedCommand::DrawInstanced {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }
}
