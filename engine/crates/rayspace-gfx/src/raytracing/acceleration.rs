use ash::vk;

/// 加速结构的结果与 scratch 地址需要按此对齐
pub const ACCELERATION_STRUCTURE_ALIGNMENT: u64 = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxTrianglesGeometry {
    pub vertex_buffer: vk::DeviceAddress,
    pub vertex_count: u32,
    pub vertex_stride: u64,
    pub vertex_format: vk::Format,
    pub index_buffer: vk::DeviceAddress,
    pub index_count: u32,
    pub index_type: vk::IndexType,
    pub transform_buffer: Option<vk::DeviceAddress>,
    pub flags: vk::GeometryFlagsKHR,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxAabbsGeometry {
    pub buffer: vk::DeviceAddress,
    pub count: u32,
    pub stride: u64,
    pub flags: vk::GeometryFlagsKHR,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxGeometryDesc {
    Triangles(GfxTrianglesGeometry),
    Aabbs(GfxAabbsGeometry),
}
impl GfxGeometryDesc {
    /// 图元数量
    #[inline]
    pub fn primitive_count(&self) -> u32 {
        match self {
            Self::Triangles(triangles) => triangles.index_count / 3,
            Self::Aabbs(aabbs) => aabbs.count,
        }
    }
}

/// 一次加速结构构建的输入
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxAccelerationStructureInputs {
    pub ty: vk::AccelerationStructureTypeKHR,
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
    /// 底层加速结构的几何
    pub geometries: Vec<GfxGeometryDesc>,
    /// 顶层加速结构的实例数量与实例描述地址
    pub instance_count: u32,
    pub instances: vk::DeviceAddress,
}
impl GfxAccelerationStructureInputs {
    pub fn bottom_level(geometries: Vec<GfxGeometryDesc>, flags: vk::BuildAccelerationStructureFlagsKHR) -> Self {
        Self {
            ty: vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            flags,
            geometries,
            instance_count: 0,
            instances: 0,
        }
    }

    pub fn top_level(
        instance_count: u32,
        instances: vk::DeviceAddress,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Self {
        Self {
            ty: vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            flags,
            geometries: Vec::new(),
            instance_count,
            instances,
        }
    }
}

/// 记录到命令列表中的构建命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxAccelerationStructureBuild {
    pub inputs: GfxAccelerationStructureInputs,
    pub mode: vk::BuildAccelerationStructureModeKHR,
    pub dst: vk::DeviceAddress,
    /// 仅 UPDATE 模式下存在
    pub src: Option<vk::DeviceAddress>,
    pub scratch: vk::DeviceAddress,
}

/// 设备给出的保守尺寸
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxAccelerationStructureSizes {
    pub result_size: u64,
    pub build_scratch_size: u64,
    pub update_scratch_size: u64,
}
