//! 光追场景
//!
//! [`space::Space`] 持有全部可绘制对象、材质、动画控制器与加速结构，
//! 每帧按固定顺序录制：上传 -> 刷新着色器资源 -> 绑定 -> 动画 -> 构建加速结构 -> 发射光线 -> 拷贝输出 -> 绘制光栅效果。

pub mod animation;
pub mod camera;
pub mod drawable;
pub mod drawables_group;
pub mod gpu_data;
pub mod light;
pub mod material;
pub mod raster_pipeline;
pub mod shader_buffer;
pub mod shared_index_buffer;
pub mod space;
