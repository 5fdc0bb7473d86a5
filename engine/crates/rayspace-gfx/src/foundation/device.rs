use ash::vk;

use crate::commands::command_list::GfxCommandList;
use crate::descriptors::descriptor_heap::GfxDescriptorHeapDesc;
use crate::descriptors::root_signature::GfxRootSignatureDesc;
use crate::error::GfxResult;
use crate::pipelines::pipeline_desc::{
    GfxComputePipelineDesc, GfxRasterPipelineDesc, GfxRaytracingPipelineDesc, GfxRtPipelineProps,
};
use crate::raytracing::acceleration::{GfxAccelerationStructureInputs, GfxAccelerationStructureSizes};
use crate::resources::buffer::GfxBufferDesc;
use crate::resources::handles::{
    BufferHandle, DescriptorHeapHandle, PipelineHandle, RootSignatureHandle, TextureHandle,
};
use crate::resources::texture::GfxTextureDesc;
use crate::resources::views::GfxViewDescriptor;

/// 场景层可见的全部设备能力
///
/// 资源以 handle 表示，生命周期由 [`crate::resources::buffer::GfxBuffer`] 等 RAII 封装管理。
/// 方法都只需要 `&self`，实现内部自行处理可变状态。
pub trait GfxDevice {
    // buffer
    /// 返回 buffer handle 与其设备地址
    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<(BufferHandle, vk::DeviceAddress)>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn write_buffer(&self, buffer: BufferHandle, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()>;

    // texture
    fn create_texture(&self, desc: &GfxTextureDesc) -> GfxResult<TextureHandle>;
    fn destroy_texture(&self, texture: TextureHandle);

    // descriptor
    fn create_descriptor_heap(&self, desc: &GfxDescriptorHeapDesc) -> GfxResult<DescriptorHeapHandle>;
    fn destroy_descriptor_heap(&self, heap: DescriptorHeapHandle);
    fn write_descriptor(&self, heap: DescriptorHeapHandle, offset: u32, view: &GfxViewDescriptor);
    fn copy_descriptors(
        &self,
        dst: DescriptorHeapHandle,
        dst_offset: u32,
        src: DescriptorHeapHandle,
        src_offset: u32,
        count: u32,
    );

    // pipeline
    fn create_root_signature(&self, desc: &GfxRootSignatureDesc) -> GfxResult<RootSignatureHandle>;
    fn create_compute_pipeline(&self, desc: &GfxComputePipelineDesc) -> GfxResult<PipelineHandle>;
    fn create_raytracing_pipeline(&self, desc: &GfxRaytracingPipelineDesc) -> GfxResult<PipelineHandle>;
    fn create_raster_pipeline(&self, desc: &GfxRasterPipelineDesc) -> GfxResult<PipelineHandle>;
    fn rt_pipeline_props(&self) -> GfxRtPipelineProps;
    /// 光追管线中某个导出（raygen/miss/hit group）的 shader group handle
    fn shader_group_handle(&self, pipeline: PipelineHandle, export: &str) -> GfxResult<Vec<u8>>;

    // acceleration structure
    fn acceleration_structure_build_sizes(
        &self,
        inputs: &GfxAccelerationStructureInputs,
    ) -> GfxAccelerationStructureSizes;

    // command
    fn create_command_list(&self, frames_in_flight: usize, name: &str) -> GfxResult<Box<dyn GfxCommandList>>;
}
