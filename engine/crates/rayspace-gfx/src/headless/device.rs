use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ash::vk;
use slotmap::SlotMap;

use crate::basic::math::align_up;
use crate::commands::command_list::GfxCommandList;
use crate::descriptors::descriptor_heap::GfxDescriptorHeapDesc;
use crate::descriptors::root_signature::GfxRootSignatureDesc;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;
use crate::headless::command_list::HeadlessCommandList;
use crate::headless::recorded::RecordedCommand;
use crate::pipelines::pipeline_desc::{
    GfxComputePipelineDesc, GfxRasterPipelineDesc, GfxRaytracingPipelineDesc, GfxRtPipelineProps,
};
use crate::raytracing::acceleration::{
    GfxAccelerationStructureBuild, GfxAccelerationStructureInputs, GfxAccelerationStructureSizes,
};
use crate::raytracing::tlas_generator::GfxTlasInstanceRecord;
use crate::resources::buffer::{GfxBufferDesc, GfxMemoryLocation};
use crate::resources::handles::{
    BufferHandle, DescriptorHeapHandle, PipelineHandle, RootSignatureHandle, TextureHandle,
};
use crate::resources::texture::GfxTextureDesc;
use crate::resources::views::GfxViewDescriptor;

const ADDRESS_BASE: vk::DeviceAddress = 0x1000_0000;
const ADDRESS_ALIGNMENT: u64 = 256;

/// 设备上的计数器
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub buffers_created: usize,
    pub buffers_alive: usize,
    pub textures_alive: usize,
    pub heaps_created: usize,
    pub shader_visible_heaps_created: usize,
    pub descriptor_writes: usize,
    /// 被拷贝的描述符总数
    pub descriptor_copies: usize,
    pub root_signatures_created: usize,
    pub pipelines_created: usize,
}

/// 从实例 buffer 中解出的一条 TLAS 实例
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeadlessTlasInstance {
    pub transform: [f32; 12],
    pub instance_id: u32,
    pub mask: u8,
    pub hit_group_index: u32,
    pub flags: u8,
    pub blas_address: vk::DeviceAddress,
}

struct HeadlessBuffer {
    desc: GfxBufferDesc,
    address: vk::DeviceAddress,
    /// 仅 CPU 可写的 buffer 保存内容
    contents: Option<Vec<u8>>,
}

struct HeadlessHeap {
    desc: GfxDescriptorHeapDesc,
    slots: Vec<Option<GfxViewDescriptor>>,
}

struct HeadlessPipeline {
    exports: Vec<String>,
}

#[derive(Default)]
struct HeadlessState {
    buffers: SlotMap<BufferHandle, HeadlessBuffer>,
    textures: SlotMap<TextureHandle, GfxTextureDesc>,
    heaps: SlotMap<DescriptorHeapHandle, HeadlessHeap>,
    root_signatures: SlotMap<RootSignatureHandle, GfxRootSignatureDesc>,
    pipelines: SlotMap<PipelineHandle, HeadlessPipeline>,

    next_address: vk::DeviceAddress,
    stats: HeadlessStats,
}

/// 只记录、不执行的设备
///
/// 地址从 `0x1000_0000` 开始线性分配，加速结构的尺寸由图元数量确定性地算出。
pub struct HeadlessDevice {
    state: RefCell<HeadlessState>,
    log: Rc<RefCell<Vec<RecordedCommand>>>,
    failure: Cell<Option<vk::Result>>,
    props: GfxRtPipelineProps,
}
impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(HeadlessState {
                next_address: ADDRESS_BASE,
                ..Default::default()
            }),
            log: Rc::new(RefCell::new(Vec::new())),
            failure: Cell::new(None),
            props: GfxRtPipelineProps::default(),
        }
    }

    /// 下一次创建资源时返回 `code`
    pub fn fail_next_creation(&self, code: vk::Result) {
        self.failure.set(Some(code));
    }
}
// getter
impl HeadlessDevice {
    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats.clone()
    }

    /// 取走目前为止记录的全部命令
    pub fn take_commands(&self) -> Vec<RecordedCommand> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(buffer).and_then(|buffer| buffer.contents.clone())
    }

    /// 按设备地址读取 CPU 可写 buffer 的内容
    pub fn read_address(&self, address: vk::DeviceAddress, len: usize) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let buffer = state
            .buffers
            .values()
            .find(|buffer| address >= buffer.address && address + len as u64 <= buffer.address + buffer.desc.size)?;
        let contents = buffer.contents.as_ref()?;
        let start = (address - buffer.address) as usize;
        Some(contents[start..start + len].to_vec())
    }

    pub fn heap_slot(&self, heap: DescriptorHeapHandle, offset: u32) -> Option<GfxViewDescriptor> {
        self.state.borrow().heaps.get(heap).and_then(|heap| heap.slots.get(offset as usize).cloned().flatten())
    }

    pub fn heap_count(&self, heap: DescriptorHeapHandle) -> Option<u32> {
        self.state.borrow().heaps.get(heap).map(|heap| heap.desc.count)
    }

    pub fn root_signature_desc(&self, root_signature: RootSignatureHandle) -> Option<GfxRootSignatureDesc> {
        self.state.borrow().root_signatures.get(root_signature).cloned()
    }

    /// 解出一次 TLAS 构建所使用的实例描述
    pub fn tlas_instances(&self, build: &GfxAccelerationStructureBuild) -> Vec<HeadlessTlasInstance> {
        const RECORD_SIZE: usize = size_of::<GfxTlasInstanceRecord>();

        let count = build.inputs.instance_count as usize;
        let Some(bytes) = self.read_address(build.inputs.instances, count * RECORD_SIZE) else {
            return Vec::new();
        };

        bytes
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let record: GfxTlasInstanceRecord = bytemuck::pod_read_unaligned(chunk);
                HeadlessTlasInstance {
                    transform: record.transform,
                    instance_id: record.custom_index_and_mask & 0x00ff_ffff,
                    mask: (record.custom_index_and_mask >> 24) as u8,
                    hit_group_index: record.sbt_offset_and_flags & 0x00ff_ffff,
                    flags: (record.sbt_offset_and_flags >> 24) as u8,
                    blas_address: record.blas_address,
                }
            })
            .collect()
    }
}
// tools
impl HeadlessDevice {
    fn check_failure(&self, context: &str) -> GfxResult<()> {
        match self.failure.take() {
            Some(code) => Err(GfxError::new(code, context)),
            None => Ok(()),
        }
    }

    fn add_pipeline(&self, exports: Vec<String>) -> PipelineHandle {
        let mut state = self.state.borrow_mut();
        state.stats.pipelines_created += 1;
        state.pipelines.insert(HeadlessPipeline { exports })
    }
}
impl GfxDevice for HeadlessDevice {
    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<(BufferHandle, vk::DeviceAddress)> {
        self.check_failure(&format!("create buffer '{}'", desc.name))?;

        let mut state = self.state.borrow_mut();
        let address = state.next_address;
        state.next_address = align_up(address + desc.size.max(1), ADDRESS_ALIGNMENT);
        state.stats.buffers_created += 1;
        state.stats.buffers_alive += 1;

        let contents = (desc.location == GfxMemoryLocation::CpuToGpu).then(|| vec![0u8; desc.size as usize]);
        let handle = state.buffers.insert(HeadlessBuffer {
            desc: desc.clone(),
            address,
            contents,
        });
        Ok((handle, address))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.borrow_mut();
        if state.buffers.remove(buffer).is_some() {
            state.stats.buffers_alive -= 1;
        }
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let Some(contents) = state.buffers.get_mut(buffer).and_then(|buffer| buffer.contents.as_mut()) else {
            return Err(GfxError::new(vk::Result::ERROR_MEMORY_MAP_FAILED, "write buffer"));
        };
        let start = offset as usize;
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, desc: &GfxTextureDesc) -> GfxResult<TextureHandle> {
        self.check_failure(&format!("create texture '{}'", desc.name))?;

        let mut state = self.state.borrow_mut();
        state.stats.textures_alive += 1;
        Ok(state.textures.insert(desc.clone()))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut state = self.state.borrow_mut();
        if state.textures.remove(texture).is_some() {
            state.stats.textures_alive -= 1;
        }
    }

    fn create_descriptor_heap(&self, desc: &GfxDescriptorHeapDesc) -> GfxResult<DescriptorHeapHandle> {
        self.check_failure(&format!("create descriptor heap '{}'", desc.name))?;

        let mut state = self.state.borrow_mut();
        state.stats.heaps_created += 1;
        if desc.shader_visible {
            state.stats.shader_visible_heaps_created += 1;
        }
        Ok(state.heaps.insert(HeadlessHeap {
            desc: desc.clone(),
            slots: vec![None; desc.count as usize],
        }))
    }

    fn destroy_descriptor_heap(&self, heap: DescriptorHeapHandle) {
        self.state.borrow_mut().heaps.remove(heap);
    }

    fn write_descriptor(&self, heap: DescriptorHeapHandle, offset: u32, view: &GfxViewDescriptor) {
        let mut state = self.state.borrow_mut();
        state.stats.descriptor_writes += 1;
        let Some(heap) = state.heaps.get_mut(heap) else {
            panic!("write to destroyed descriptor heap");
        };
        heap.slots[offset as usize] = Some(view.clone());
    }

    fn copy_descriptors(
        &self,
        dst: DescriptorHeapHandle,
        dst_offset: u32,
        src: DescriptorHeapHandle,
        src_offset: u32,
        count: u32,
    ) {
        let mut state = self.state.borrow_mut();
        state.stats.descriptor_copies += count as usize;

        let copied = {
            let Some(src) = state.heaps.get(src) else {
                panic!("copy from destroyed descriptor heap");
            };
            src.slots[src_offset as usize..(src_offset + count) as usize].to_vec()
        };
        let Some(dst) = state.heaps.get_mut(dst) else {
            panic!("copy to destroyed descriptor heap");
        };
        dst.slots[dst_offset as usize..(dst_offset + count) as usize].clone_from_slice(&copied);
    }

    fn create_root_signature(&self, desc: &GfxRootSignatureDesc) -> GfxResult<RootSignatureHandle> {
        self.check_failure(&format!("create root signature '{}'", desc.name))?;

        let mut state = self.state.borrow_mut();
        state.stats.root_signatures_created += 1;
        Ok(state.root_signatures.insert(desc.clone()))
    }

    fn create_compute_pipeline(&self, desc: &GfxComputePipelineDesc) -> GfxResult<PipelineHandle> {
        self.check_failure(&format!("create compute pipeline '{}'", desc.name))?;
        Ok(self.add_pipeline(Vec::new()))
    }

    fn create_raytracing_pipeline(&self, desc: &GfxRaytracingPipelineDesc) -> GfxResult<PipelineHandle> {
        self.check_failure(&format!("create raytracing pipeline '{}'", desc.name))?;

        let exports = desc
            .libraries
            .iter()
            .flat_map(|library| library.exports.iter().cloned())
            .chain(desc.hit_groups.iter().map(|group| group.name.clone()))
            .collect();
        Ok(self.add_pipeline(exports))
    }

    fn create_raster_pipeline(&self, desc: &GfxRasterPipelineDesc) -> GfxResult<PipelineHandle> {
        self.check_failure(&format!("create raster pipeline '{}'", desc.name))?;
        Ok(self.add_pipeline(Vec::new()))
    }

    fn rt_pipeline_props(&self) -> GfxRtPipelineProps {
        self.props
    }

    fn shader_group_handle(&self, pipeline: PipelineHandle, export: &str) -> GfxResult<Vec<u8>> {
        let state = self.state.borrow();
        let index = state
            .pipelines
            .get(pipeline)
            .and_then(|pipeline| pipeline.exports.iter().position(|name| name == export))
            .ok_or_else(|| GfxError::new(vk::Result::ERROR_UNKNOWN, format!("shader group handle of '{export}'")))?;

        let mut handle = vec![0u8; self.props.shader_group_handle_size as usize];
        handle[..4].copy_from_slice(&(index as u32 + 1).to_ne_bytes());
        Ok(handle)
    }

    fn acceleration_structure_build_sizes(
        &self,
        inputs: &GfxAccelerationStructureInputs,
    ) -> GfxAccelerationStructureSizes {
        let primitives = if inputs.ty == vk::AccelerationStructureTypeKHR::TOP_LEVEL {
            inputs.instance_count as u64 * 2
        } else {
            inputs.geometries.iter().map(|geometry| geometry.primitive_count() as u64).sum()
        };

        GfxAccelerationStructureSizes {
            result_size: 200 + primitives * 64,
            build_scratch_size: 100 + primitives * 32,
            update_scratch_size: 50 + primitives * 16,
        }
    }

    fn create_command_list(&self, frames_in_flight: usize, name: &str) -> GfxResult<Box<dyn GfxCommandList>> {
        self.check_failure(&format!("create command list '{name}'"))?;
        Ok(Box::new(HeadlessCommandList::new(self.log.clone(), frames_in_flight, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::barrier::GfxResourceState;
    use crate::resources::buffer::GfxBuffer;

    fn device() -> (Rc<HeadlessDevice>, Rc<dyn GfxDevice>) {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        (headless, device)
    }

    #[test]
    fn test_buffer_lifetime_is_tracked() {
        let (headless, device) = device();
        let buffer = GfxBuffer::new_upload(&device, 300, "upload").unwrap();
        assert_eq!(buffer.device_address() % ADDRESS_ALIGNMENT, 0);
        assert_eq!(headless.stats().buffers_alive, 1);

        buffer.write(4, &7u32).unwrap();
        let contents = headless.buffer_contents(buffer.handle()).unwrap();
        assert_eq!(&contents[4..8], &7u32.to_ne_bytes());

        drop(buffer);
        assert_eq!(headless.stats().buffers_alive, 0);
    }

    #[test]
    fn test_injected_failure_is_reported_once() {
        let (headless, device) = device();
        headless.fail_next_creation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        let err = GfxBuffer::new_device_local(&device, 64, GfxResourceState::COMMON, "doomed").unwrap_err();
        assert_eq!(err.code, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(err.context.contains("doomed"));

        assert!(GfxBuffer::new_device_local(&device, 64, GfxResourceState::COMMON, "fine").is_ok());
    }

    #[test]
    #[should_panic]
    fn test_recording_without_reset_panics() {
        let (_headless, device) = device();
        let mut cmd = device.create_command_list(2, "cmd").unwrap();
        cmd.dispatch(1, 1, 1);
    }
}
