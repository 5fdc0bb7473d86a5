use ash::vk;

use crate::basic::math::align_up;
use crate::commands::command_list::GfxCommandList;
use crate::foundation::device::GfxDevice;
use crate::raytracing::acceleration::{
    ACCELERATION_STRUCTURE_ALIGNMENT, GfxAabbsGeometry, GfxAccelerationStructureBuild,
    GfxAccelerationStructureInputs, GfxGeometryDesc, GfxTrianglesGeometry,
};

/// 底层加速结构的构建器
///
/// 使用顺序：
/// 1. `add_vertex_buffer` / `add_bounds_buffer` 添加几何
/// 2. `compute_as_buffer_sizes` 查询 scratch 与 result 的大小
/// 3. 由调用者分配内存后 `generate` 录制构建（或 refit）命令
#[derive(Default)]
pub struct GfxBlasGenerator {
    geometries: Vec<GfxGeometryDesc>,
    flags: vk::BuildAccelerationStructureFlagsKHR,

    scratch_size: u64,
    result_size: u64,
}
// new & init
impl GfxBlasGenerator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加三角形几何
    ///
    /// 顶点位置格式为 `R32G32B32_SFLOAT`，索引为 32 位。
    pub fn add_vertex_buffer(
        &mut self,
        vertex_buffer: vk::DeviceAddress,
        vertex_count: u32,
        vertex_stride: u64,
        index_buffer: Option<(vk::DeviceAddress, u32)>,
        transform_buffer: Option<vk::DeviceAddress>,
        opaque: bool,
    ) {
        let (index_buffer, index_count, index_type) = match index_buffer {
            Some((address, count)) => (address, count, vk::IndexType::UINT32),
            None => (0, vertex_count, vk::IndexType::NONE_KHR),
        };

        self.geometries.push(GfxGeometryDesc::Triangles(GfxTrianglesGeometry {
            vertex_buffer,
            vertex_count,
            vertex_stride,
            vertex_format: vk::Format::R32G32B32_SFLOAT,
            index_buffer,
            index_count,
            index_type,
            transform_buffer,
            flags: if opaque {
                vk::GeometryFlagsKHR::OPAQUE
            } else {
                vk::GeometryFlagsKHR::empty()
            },
        }));
    }

    /// 添加程序化几何的包围盒
    pub fn add_bounds_buffer(&mut self, bounds_buffer: vk::DeviceAddress, bounds_count: u32, bounds_stride: u64) {
        self.geometries.push(GfxGeometryDesc::Aabbs(GfxAabbsGeometry {
            buffer: bounds_buffer,
            count: bounds_count,
            stride: bounds_stride,
            flags: vk::GeometryFlagsKHR::empty(),
        }));
    }
}
// getter
impl GfxBlasGenerator {
    #[inline]
    pub fn geometries(&self) -> &[GfxGeometryDesc] {
        &self.geometries
    }

    #[inline]
    pub fn allows_update(&self) -> bool {
        self.flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE)
    }
}
// tools
impl GfxBlasGenerator {
    /// 返回 `(scratch_size, result_size)`，均按 256 字节对齐
    ///
    /// 同时记录构建标志，`allow_update` 决定之后能否 refit。
    pub fn compute_as_buffer_sizes(&mut self, device: &dyn GfxDevice, allow_update: bool) -> (u64, u64) {
        self.flags = if allow_update {
            vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE
        } else {
            vk::BuildAccelerationStructureFlagsKHR::empty()
        };

        let sizes = device.acceleration_structure_build_sizes(&self.inputs());
        let scratch = if allow_update {
            sizes.build_scratch_size.max(sizes.update_scratch_size)
        } else {
            sizes.build_scratch_size
        };

        self.scratch_size = align_up(scratch, ACCELERATION_STRUCTURE_ALIGNMENT);
        self.result_size = align_up(sizes.result_size, ACCELERATION_STRUCTURE_ALIGNMENT);
        (self.scratch_size, self.result_size)
    }

    /// 录制构建命令
    ///
    /// `update_only` 时执行 refit，要求之前以 `allow_update` 计算过尺寸，并给出上一次的结果地址。
    pub fn generate(
        &self,
        cmd: &mut dyn GfxCommandList,
        scratch: vk::DeviceAddress,
        result: vk::DeviceAddress,
        update_only: bool,
        previous_result: Option<vk::DeviceAddress>,
    ) {
        if update_only {
            assert!(self.allows_update(), "cannot update a bottom-level AS not built for updates");
            assert!(
                previous_result.is_some_and(|address| address != 0),
                "bottom-level AS update requires the previous result"
            );
        }
        assert!(
            self.result_size != 0 && self.scratch_size != 0,
            "compute_as_buffer_sizes must be called before generate"
        );

        let build = GfxAccelerationStructureBuild {
            inputs: self.inputs(),
            mode: if update_only {
                vk::BuildAccelerationStructureModeKHR::UPDATE
            } else {
                vk::BuildAccelerationStructureModeKHR::BUILD
            },
            dst: result,
            src: if update_only { previous_result } else { None },
            scratch,
        };
        cmd.build_acceleration_structure(&build);
    }

    fn inputs(&self) -> GfxAccelerationStructureInputs {
        GfxAccelerationStructureInputs::bottom_level(self.geometries.clone(), self.flags)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::headless::HeadlessDevice;

    fn quad_generator() -> GfxBlasGenerator {
        let mut generator = GfxBlasGenerator::new();
        generator.add_vertex_buffer(0x1000_0000, 4, 16, Some((0x2000_0000, 6)), None, true);
        generator
    }

    #[test]
    fn test_sizes_are_aligned() {
        let device = HeadlessDevice::new();
        let mut generator = quad_generator();
        let (scratch, result) = generator.compute_as_buffer_sizes(&device, false);
        assert_eq!(scratch % ACCELERATION_STRUCTURE_ALIGNMENT, 0);
        assert_eq!(result % ACCELERATION_STRUCTURE_ALIGNMENT, 0);
        assert!(!generator.allows_update());
    }

    #[test]
    fn test_refit_records_update_with_previous_result() {
        let device = Rc::new(HeadlessDevice::new());
        let mut cmd = device.create_command_list(1, "cmd").unwrap();
        cmd.reset(0);

        let mut generator = quad_generator();
        generator.compute_as_buffer_sizes(device.as_ref(), true);
        generator.generate(cmd.as_mut(), 0x300, 0x400, true, Some(0x400));

        let commands = device.take_commands();
        let build = commands.iter().find_map(|command| command.as_build()).unwrap();
        assert_eq!(build.mode, vk::BuildAccelerationStructureModeKHR::UPDATE);
        assert_eq!(build.src, Some(0x400));
        assert!(build.inputs.flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE));
    }

    #[test]
    #[should_panic(expected = "not built for updates")]
    fn test_refit_without_allow_update_panics() {
        let device = HeadlessDevice::new();
        let mut cmd = device.create_command_list(1, "cmd").unwrap();
        cmd.reset(0);

        let mut generator = quad_generator();
        generator.compute_as_buffer_sizes(&device, false);
        generator.generate(cmd.as_mut(), 0x300, 0x400, true, Some(0x400));
    }

    #[test]
    #[should_panic(expected = "previous result")]
    fn test_refit_without_previous_result_panics() {
        let device = HeadlessDevice::new();
        let mut cmd = device.create_command_list(1, "cmd").unwrap();
        cmd.reset(0);

        let mut generator = quad_generator();
        generator.compute_as_buffer_sizes(&device, true);
        generator.generate(cmd.as_mut(), 0x300, 0x400, true, None);
    }

    #[test]
    #[should_panic(expected = "compute_as_buffer_sizes")]
    fn test_generate_before_sizes_panics() {
        let device = HeadlessDevice::new();
        let mut cmd = device.create_command_list(1, "cmd").unwrap();
        cmd.reset(0);

        quad_generator().generate(cmd.as_mut(), 0x300, 0x400, false, None);
    }
}
