use ash::vk;
use rayspace_gfx::resources::handles::TextureHandle;

/// 光栅阶段的视口与裁剪矩形
#[derive(Copy, Clone, Debug, Default)]
pub struct RasterInfo {
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
}
impl RasterInfo {
    /// 覆盖整个 `extent` 的视口
    pub fn full(extent: vk::Extent2D) -> Self {
        Self {
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }
}

/// 宿主在每帧 `render` 时提供的绘制目标
#[derive(Copy, Clone, Debug)]
pub struct RenderData {
    /// 光追结果会被拷贝到这里，随后在其上绘制光栅效果
    pub render_target: TextureHandle,
    pub depth_stencil: TextureHandle,
    pub raster: RasterInfo,
}
