//! 与着色器共享的数据布局
//!
//! 全部为 `#[repr(C)]` 且实现 [`bytemuck::Pod`]，直接按字节写入上传 buffer。

use bytemuck::{Pod, Zeroable};

/// 三角形网格的顶点，四个顶点组成一个 quad
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpatialVertex {
    pub position: [f32; 3],
    pub data: u32,
}

/// 程序化几何的包围盒
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpatialBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub data: [u32; 4],
}

/// 每个 mesh 实例的常量
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshDataBuffer {
    pub object_to_world: glam::Mat4,
    /// `object_to_world` 的逆转置
    pub object_to_world_normal: glam::Mat4,
}
impl MeshDataBuffer {
    pub fn from_transform(transform: &glam::Mat4) -> Self {
        Self {
            object_to_world: *transform,
            object_to_world_normal: transform.inverse().transpose(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct EffectVertex {
    pub position: [f32; 3],
    pub data: u32,
}

/// 每个光栅效果实例的常量
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct EffectDataBuffer {
    pub pvm: glam::Mat4,
    pub z_near: f32,
    pub z_far: f32,
    pub _padding: [f32; 2],
}

/// 全局常量
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalBuffer {
    pub time: f32,
    /// 纹理槽中纹理的尺寸：宽、高、深
    pub texture_size: [u32; 3],
    pub light_direction: [f32; 3],
    pub min_light: f32,
    pub min_shadow: f32,
}
impl Default for GlobalBuffer {
    fn default() -> Self {
        Self {
            time: 0.0,
            texture_size: [1, 1, 1],
            light_direction: [0.0, -1.0, 0.0],
            min_light: 0.4,
            min_shadow: 0.2,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraParametersBuffer {
    pub view: glam::Mat4,
    pub projection: glam::Mat4,
    pub view_inverse: glam::Mat4,
    pub projection_inverse: glam::Mat4,

    pub near: f32,
    pub far: f32,
    /// 锥体追踪使用的像素展开角
    pub spread: f32,
    pub _padding: f32,
}

/// 材质常量，作为 hit group 的局部根参数
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MaterialBuffer {
    pub index: u32,
}

/// 动画计算着色器的一条工作项
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AnimationSubmission {
    /// 在动画控制器中的序号，用于索引几何列表
    pub mesh_index: u32,
    /// 在激活集合中的序号
    pub instance_index: u32,
    /// 起始几何单元
    pub offset: u32,
    /// 几何单元数量，不超过 [`AnimationThreadGroup::ELEMENTS_PER_SUBMISSION`]
    pub count: u32,
}

/// 一个线程组处理的全部工作项
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AnimationThreadGroup {
    pub submissions: [AnimationSubmission; AnimationThreadGroup::SUBMISSIONS_PER_GROUP],
}
impl AnimationThreadGroup {
    pub const SUBMISSIONS_PER_GROUP: usize = 16;
    pub const ELEMENTS_PER_SUBMISSION: u32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<SpatialVertex>(), 16);
        assert_eq!(size_of::<SpatialBounds>(), 40);
        assert_eq!(size_of::<MeshDataBuffer>(), 128);
        assert_eq!(size_of::<EffectDataBuffer>(), 80);
        assert_eq!(size_of::<CameraParametersBuffer>(), 272);
        assert_eq!(size_of::<AnimationThreadGroup>(), 16 * 16);
    }

    #[test]
    fn test_normal_matrix_of_translation_is_identity_in_upper_block() {
        let data = MeshDataBuffer::from_transform(&glam::Mat4::from_translation(glam::vec3(1.0, 2.0, 3.0)));
        let normal = data.object_to_world_normal;
        assert_eq!(normal.x_axis.truncate(), glam::Vec3::X);
        assert_eq!(normal.y_axis.truncate(), glam::Vec3::Y);
        assert_eq!(normal.z_axis.truncate(), glam::Vec3::Z);
    }
}
