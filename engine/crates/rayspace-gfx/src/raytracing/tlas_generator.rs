use ash::vk;

use crate::basic::bytes::BytesConvert;
use crate::basic::math::{align_up, get_rt_matrix};
use crate::commands::barrier::GfxResourceBarrier;
use crate::commands::command_list::GfxCommandList;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::raytracing::acceleration::{
    ACCELERATION_STRUCTURE_ALIGNMENT, GfxAccelerationStructureBuild, GfxAccelerationStructureInputs,
};
use crate::resources::buffer::GfxBuffer;

/// TLAS 中的一个实例
#[derive(Copy, Clone, Debug)]
pub struct GfxTlasInstance {
    pub blas_address: vk::DeviceAddress,
    pub transform: glam::Mat4,
    /// 着色器中可见的 InstanceID，24 位
    pub instance_id: u32,
    pub hit_group_index: u32,
    pub mask: u8,
    pub flags: vk::GeometryInstanceFlagsKHR,
}

/// 写入实例描述 buffer 的一条记录，布局与 `VkAccelerationStructureInstanceKHR` 一致
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GfxTlasInstanceRecord {
    /// 行主序的 3x4 变换
    pub transform: [f32; 12],
    /// 低 24 位为 InstanceID，高 8 位为 mask
    pub custom_index_and_mask: u32,
    /// 低 24 位为 SBT 偏移，高 8 位为实例 flags
    pub sbt_offset_and_flags: u32,
    pub blas_address: vk::DeviceAddress,
}
const _: () = assert!(size_of::<GfxTlasInstanceRecord>() == size_of::<vk::AccelerationStructureInstanceKHR>());

/// TLAS 各 buffer 的尺寸
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxTlasSizes {
    pub scratch: u64,
    pub result: u64,
    pub instance_descs: u64,
}

/// 顶层加速结构的构建器
#[derive(Default)]
pub struct GfxTlasGenerator {
    instances: Vec<GfxTlasInstance>,
    flags: vk::BuildAccelerationStructureFlagsKHR,
    sizes: GfxTlasSizes,
}
// new & init
impl GfxTlasGenerator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(&mut self, instance: GfxTlasInstance) {
        debug_assert!(instance.instance_id < (1 << 24));
        debug_assert!(instance.hit_group_index < (1 << 24));
        self.instances.push(instance);
    }
}
// getter
impl GfxTlasGenerator {
    #[inline]
    pub fn instances(&self) -> &[GfxTlasInstance] {
        &self.instances
    }
}
// tools
impl GfxTlasGenerator {
    /// 实例描述 buffer 最少 256 字节，即使没有实例
    pub fn compute_as_buffer_sizes(&mut self, device: &dyn GfxDevice, allow_update: bool) -> GfxTlasSizes {
        self.flags = if allow_update {
            vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE
        } else {
            vk::BuildAccelerationStructureFlagsKHR::empty()
        };

        let sizes = device.acceleration_structure_build_sizes(&self.inputs(0));
        let instance_bytes = (std::mem::size_of::<GfxTlasInstanceRecord>() * self.instances.len()) as u64;

        self.sizes = GfxTlasSizes {
            scratch: align_up(sizes.build_scratch_size.max(sizes.update_scratch_size), ACCELERATION_STRUCTURE_ALIGNMENT),
            result: align_up(sizes.result_size, ACCELERATION_STRUCTURE_ALIGNMENT),
            instance_descs: align_up(instance_bytes, ACCELERATION_STRUCTURE_ALIGNMENT).max(ACCELERATION_STRUCTURE_ALIGNMENT),
        };
        self.sizes
    }

    /// 写入实例描述并录制构建命令，结尾对结果 buffer 加 UAV 屏障
    ///
    /// `instance_descs` 必须位于上传内存。
    pub fn generate(
        &self,
        cmd: &mut dyn GfxCommandList,
        scratch: &GfxBuffer,
        result: &GfxBuffer,
        instance_descs: &GfxBuffer,
        update_only: bool,
        previous_result: Option<&GfxBuffer>,
    ) -> GfxResult<()> {
        if update_only {
            assert!(
                self.flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE),
                "cannot update a top-level AS not originally built for updates"
            );
            assert!(previous_result.is_some(), "top-level AS update requires the previous result");
        }
        assert!(
            instance_descs.size() >= self.sizes.instance_descs,
            "instance descriptor buffer too small: {} < {}",
            instance_descs.size(),
            self.sizes.instance_descs
        );

        let records = self.instances.iter().map(Self::instance_record).collect::<Vec<_>>();
        if !update_only {
            instance_descs.write_bytes(0, &vec![0u8; self.sizes.instance_descs as usize])?;
        }
        if !records.is_empty() {
            instance_descs.write_bytes(0, BytesConvert::bytes_of_slice(&records))?;
        }

        let build = GfxAccelerationStructureBuild {
            inputs: self.inputs(instance_descs.device_address()),
            mode: if update_only {
                vk::BuildAccelerationStructureModeKHR::UPDATE
            } else {
                vk::BuildAccelerationStructureModeKHR::BUILD
            },
            dst: result.device_address(),
            src: previous_result.filter(|_| update_only).map(GfxBuffer::device_address),
            scratch: scratch.device_address(),
        };
        cmd.build_acceleration_structure(&build);
        cmd.resource_barriers(&[GfxResourceBarrier::uav(result.handle())]);
        Ok(())
    }

    fn inputs(&self, instances: vk::DeviceAddress) -> GfxAccelerationStructureInputs {
        GfxAccelerationStructureInputs::top_level(
            self.instances.len() as u32,
            instances,
            self.flags | vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE,
        )
    }

    fn instance_record(instance: &GfxTlasInstance) -> GfxTlasInstanceRecord {
        GfxTlasInstanceRecord {
            transform: get_rt_matrix(&instance.transform).matrix,
            custom_index_and_mask: (instance.instance_id & 0x00ff_ffff) | ((instance.mask as u32) << 24),
            sbt_offset_and_flags: (instance.hit_group_index & 0x00ff_ffff) | ((instance.flags.as_raw() & 0xff) << 24),
            blas_address: instance.blas_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::commands::barrier::{GfxBarrierKind, GfxResourceState};
    use crate::headless::{HeadlessDevice, RecordedCommand};

    #[test]
    fn test_empty_tlas_still_gets_instance_buffer() {
        let device = HeadlessDevice::new();
        let mut generator = GfxTlasGenerator::new();
        let sizes = generator.compute_as_buffer_sizes(&device, false);
        assert_eq!(sizes.instance_descs, ACCELERATION_STRUCTURE_ALIGNMENT);
    }

    #[test]
    fn test_instances_are_written_before_build() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let mut cmd = device.create_command_list(1, "cmd").unwrap();
        cmd.reset(0);

        let mut generator = GfxTlasGenerator::new();
        for id in 0..3u32 {
            generator.add_instance(GfxTlasInstance {
                blas_address: 0x4000 + id as u64 * 0x100,
                transform: glam::Mat4::from_translation(glam::vec3(id as f32, 0.0, 0.0)),
                instance_id: id,
                hit_group_index: id * 2,
                mask: 0b11,
                flags: vk::GeometryInstanceFlagsKHR::TRIANGLE_FRONT_COUNTERCLOCKWISE,
            });
        }
        let sizes = generator.compute_as_buffer_sizes(device.as_ref(), false);

        let state = GfxResourceState::RAYTRACING_ACCELERATION_STRUCTURE;
        let scratch = GfxBuffer::new_device_local(&device, sizes.scratch, GfxResourceState::UNORDERED_ACCESS, "s").unwrap();
        let result = GfxBuffer::new_device_local(&device, sizes.result, state, "r").unwrap();
        let descs = GfxBuffer::new_upload(&device, sizes.instance_descs, "d").unwrap();
        generator.generate(cmd.as_mut(), &scratch, &result, &descs, false, None).unwrap();

        let commands = headless.take_commands();
        let build = commands.iter().find_map(RecordedCommand::as_build).unwrap();
        assert_eq!(build.inputs.instance_count, 3);
        assert!(build.inputs.flags.contains(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE));

        let instances = headless.tlas_instances(build);
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[2].instance_id, 2);
        assert_eq!(instances[2].hit_group_index, 4);
        assert_eq!(instances[2].mask, 0b11);
        assert_eq!(instances[2].blas_address, 0x4200);
        assert_eq!(
            instances[2].flags as u32,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FRONT_COUNTERCLOCKWISE.as_raw()
        );
        assert_eq!(instances[2].transform[3], 2.0);

        let Some(RecordedCommand::ResourceBarriers(barriers)) = commands.last() else {
            panic!("tlas build must end with a barrier");
        };
        assert_eq!(barriers[0].kind(), GfxBarrierKind::UnorderedAccess);
    }
}
