use ash::vk;

use crate::pipelines::shader::GfxShaderBlob;
use crate::resources::handles::RootSignatureHandle;

pub struct GfxComputePipelineDesc<'a> {
    pub shader: &'a GfxShaderBlob,
    pub root_signature: RootSignatureHandle,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxHitGroupDesc {
    pub name: String,
    pub closest_hit: String,
    pub any_hit: Option<String>,
    /// 存在时为程序化几何的 hit group
    pub intersection: Option<String>,
}

/// 把局部根签名关联到一组导出符号
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxLocalRootAssociation {
    pub root_signature: RootSignatureHandle,
    pub exports: Vec<String>,
}

pub struct GfxRaytracingPipelineDesc<'a> {
    pub libraries: Vec<&'a GfxShaderBlob>,
    pub hit_groups: Vec<GfxHitGroupDesc>,
    pub global_root_signature: RootSignatureHandle,
    pub local_root_signatures: Vec<GfxLocalRootAssociation>,
    pub max_payload_size: u32,
    pub max_attribute_size: u32,
    pub max_recursion_depth: u32,
    pub name: String,
}

pub struct GfxRasterPipelineDesc<'a> {
    pub vertex_shader: &'a GfxShaderBlob,
    pub pixel_shader: &'a GfxShaderBlob,
    pub root_signature: RootSignatureHandle,
    pub vertex_stride: u32,
    pub topology: vk::PrimitiveTopology,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub name: String,
}

/// 光追管线的设备属性，用于计算 SBT 布局
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxRtPipelineProps {
    pub shader_group_handle_size: u32,
    pub shader_group_handle_alignment: u32,
    pub shader_group_base_alignment: u32,
}
impl Default for GfxRtPipelineProps {
    fn default() -> Self {
        Self {
            shader_group_handle_size: 32,
            shader_group_handle_alignment: 32,
            shader_group_base_alignment: 64,
        }
    }
}
