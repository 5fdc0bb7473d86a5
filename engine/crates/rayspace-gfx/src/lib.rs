//! 光追场景使用的 GPU 抽象层
//!
//! 所有 GPU 交互都经过 [`foundation::device::GfxDevice`] 与 [`commands::command_list::GfxCommandList`]
//! 两个 trait，场景层不直接接触具体后端。`headless` 后端只记录命令，用于测试与离线驱动。

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod headless;
pub mod pipelines;
pub mod raytracing;
pub mod resources;

pub mod prelude {
    pub use crate::commands::barrier::{GfxResourceBarrier, GfxResourceState};
    pub use crate::commands::command_list::GfxCommandList;
    pub use crate::error::{GfxError, GfxResult, VkResultExt};
    pub use crate::foundation::device::GfxDevice;
    pub use crate::resources::buffer::{GfxBuffer, GfxBufferDesc, GfxMemoryLocation};
    pub use crate::resources::handles::{BufferHandle, ResourceHandle, TextureHandle};
    pub use crate::resources::texture::{GfxTexture, GfxTextureDesc};
}
