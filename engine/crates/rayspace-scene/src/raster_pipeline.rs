use std::rc::Rc;

use ash::vk;
use rayspace_gfx::descriptors::root_signature::GfxShaderLocation;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::pipelines::pipeline_desc::GfxRasterPipelineDesc;
use rayspace_gfx::pipelines::shader::{GfxShaderBlob, GfxShaderStage};
use rayspace_gfx::resources::handles::{PipelineHandle, RootSignatureHandle};
use rayspace_gfx::resources::views::GfxConstantBufferView;
use rayspace_render_interface::shader_resources::{ConstantHandle, Description, SelectionList};
use rayspace_utils::id_issuer::{IdIssuer, ObjectId};

use crate::gpu_data::EffectVertex;

pub const EFFECT_COLOR_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const EFFECT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// 光栅效果使用的管线，根签名为 Space 的图形根签名
pub struct RasterPipeline {
    id: ObjectId,
    name: String,
    pipeline: PipelineHandle,
}
// new & init
impl RasterPipeline {
    pub fn new(
        device: &Rc<dyn GfxDevice>,
        ids: &IdIssuer,
        vertex_shader: &GfxShaderBlob,
        pixel_shader: &GfxShaderBlob,
        root_signature: RootSignatureHandle,
        name: impl Into<String>,
    ) -> GfxResult<Self> {
        assert_eq!(vertex_shader.stage, GfxShaderStage::Vertex, "'{}' is not a vertex shader", vertex_shader.name);
        assert_eq!(pixel_shader.stage, GfxShaderStage::Pixel, "'{}' is not a pixel shader", pixel_shader.name);

        let name = name.into();
        let pipeline = device.create_raster_pipeline(&GfxRasterPipelineDesc {
            vertex_shader,
            pixel_shader,
            root_signature,
            vertex_stride: size_of::<EffectVertex>() as u32,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            color_format: EFFECT_COLOR_FORMAT,
            depth_format: EFFECT_DEPTH_FORMAT,
            name: name.clone(),
        })?;

        Ok(Self {
            id: ids.issue(),
            name,
            pipeline,
        })
    }
}
// getter
impl RasterPipeline {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn handle(&self) -> PipelineHandle {
        self.pipeline
    }
}

/// 光栅效果在图形根签名中的参数
pub struct EffectBindings {
    /// 每次绘制选中一个效果的实例常量 (b1)
    instance_data: SelectionList<GfxConstantBufferView>,
    /// 场景时间 (b0, space1)
    time: ConstantHandle,
}
impl EffectBindings {
    pub fn set_up(graphics: &mut Description) -> Self {
        graphics.enable_input_assembler();
        let instance_data =
            graphics.add_constant_buffer_view_descriptor_selection_list(GfxShaderLocation::new(1, 0), 1);
        let time = graphics.add_root_constant(GfxShaderLocation::new(0, 1));
        Self { instance_data, time }
    }

    #[inline]
    pub fn instance_data(&self) -> &SelectionList<GfxConstantBufferView> {
        &self.instance_data
    }

    #[inline]
    pub fn time(&self) -> ConstantHandle {
        self.time
    }
}
