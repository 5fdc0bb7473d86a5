use std::rc::Rc;

use ash::vk;

use crate::basic::math::align_up;
use crate::commands::command_list::GfxDispatchRaysDesc;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::resources::buffer::GfxBuffer;
use crate::resources::handles::PipelineHandle;

/// SBT 中的一条记录：导出名加上局部根参数（8 字节一个）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxSbtEntry {
    pub export: String,
    pub local_root_arguments: Vec<u64>,
}
impl GfxSbtEntry {
    #[inline]
    pub fn new(export: impl Into<String>) -> Self {
        Self {
            export: export.into(),
            local_root_arguments: Vec::new(),
        }
    }

    /// builder
    #[inline]
    pub fn argument(mut self, value: u64) -> Self {
        self.local_root_arguments.push(value);
        self
    }
}

/// 着色器绑定表
///
/// 内存布局：raygen | miss | hit。每个 region 的起始位置按 base alignment 对齐，
/// 记录的 stride 按 handle alignment 对齐，raygen 的 stride 与 size 相同。
pub struct GfxShaderBindingTable {
    region_raygen: vk::StridedDeviceAddressRegionKHR,
    region_miss: vk::StridedDeviceAddressRegionKHR,
    region_hit: vk::StridedDeviceAddressRegionKHR,

    _buffer: GfxBuffer,
}
// new & init
impl GfxShaderBindingTable {
    pub fn new(
        device: &Rc<dyn GfxDevice>,
        pipeline: PipelineHandle,
        raygen: &GfxSbtEntry,
        miss: &[GfxSbtEntry],
        hit: &[GfxSbtEntry],
        name: &str,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxShaderBindingTable::new");

        let props = device.rt_pipeline_props();
        let handle_size = props.shader_group_handle_size as u64;
        let handle_alignment = props.shader_group_handle_alignment as u64;
        let base_alignment = props.shader_group_base_alignment as u64;

        let stride_of = |entries: &[GfxSbtEntry]| {
            let max_arguments = entries.iter().map(|entry| entry.local_root_arguments.len()).max().unwrap_or(0);
            align_up(handle_size + 8 * max_arguments as u64, handle_alignment)
        };

        let raygen_stride = stride_of(std::slice::from_ref(raygen));
        let raygen_size = align_up(raygen_stride, base_alignment);
        let miss_stride = stride_of(miss);
        let miss_size = align_up(miss_stride * miss.len() as u64, base_alignment);
        let hit_stride = stride_of(hit);
        let hit_size = align_up(hit_stride * hit.len() as u64, base_alignment);

        let buffer = GfxBuffer::new_upload(device, (raygen_size + miss_size + hit_size).max(base_alignment), name)?;
        let base = buffer.device_address();

        let write_region = |offset: u64, stride: u64, entries: &[GfxSbtEntry]| -> GfxResult<()> {
            for (index, entry) in entries.iter().enumerate() {
                let mut record = device.shader_group_handle(pipeline, &entry.export)?;
                record.resize(handle_size as usize, 0);
                for argument in &entry.local_root_arguments {
                    record.extend_from_slice(&argument.to_ne_bytes());
                }
                buffer.write_bytes(offset + stride * index as u64, &record)?;
            }
            Ok(())
        };
        write_region(0, raygen_stride, std::slice::from_ref(raygen))?;
        write_region(raygen_size, miss_stride, miss)?;
        write_region(raygen_size + miss_size, hit_stride, hit)?;

        log::info!(
            "shader binding table '{name}': raygen {raygen_size}B, {} miss, {} hit records",
            miss.len(),
            hit.len()
        );

        Ok(Self {
            region_raygen: vk::StridedDeviceAddressRegionKHR::default()
                .device_address(base)
                .stride(raygen_size)
                .size(raygen_size),
            region_miss: vk::StridedDeviceAddressRegionKHR::default()
                .device_address(base + raygen_size)
                .stride(miss_stride)
                .size(miss_size),
            region_hit: vk::StridedDeviceAddressRegionKHR::default()
                .device_address(base + raygen_size + miss_size)
                .stride(hit_stride)
                .size(hit_size),
            _buffer: buffer,
        })
    }
}
// getter
impl GfxShaderBindingTable {
    #[inline]
    pub fn hit_region(&self) -> vk::StridedDeviceAddressRegionKHR {
        self.region_hit
    }

    #[inline]
    pub fn miss_region(&self) -> vk::StridedDeviceAddressRegionKHR {
        self.region_miss
    }

    /// 以当前 SBT 发射 `width x height` 条光线
    pub fn dispatch_rays_desc(&self, width: u32, height: u32) -> GfxDispatchRaysDesc {
        GfxDispatchRaysDesc {
            raygen: self.region_raygen,
            miss: self.region_miss,
            hit: self.region_hit,
            callable: vk::StridedDeviceAddressRegionKHR::default(),
            width,
            height,
            depth: 1,
        }
    }
}
