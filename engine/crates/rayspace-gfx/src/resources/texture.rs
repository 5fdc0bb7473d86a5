use std::rc::Rc;

use ash::vk;

use crate::commands::barrier::GfxResourceState;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::resources::handles::TextureHandle;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxTextureDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub usage: vk::ImageUsageFlags,
    pub initial_state: GfxResourceState,
    pub name: String,
}
impl GfxTextureDesc {
    /// 可被着色器读写的 2D 纹理
    pub fn storage_2d(extent: vk::Extent2D, format: vk::Format, name: impl Into<String>) -> Self {
        Self {
            extent,
            format,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC,
            initial_state: GfxResourceState::PIXEL_SHADER_RESOURCE,
            name: name.into(),
        }
    }

    /// 只读的采样纹理
    pub fn sampled_2d(extent: vk::Extent2D, format: vk::Format, name: impl Into<String>) -> Self {
        Self {
            extent,
            format,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            initial_state: GfxResourceState::ALL_SHADER_RESOURCE,
            name: name.into(),
        }
    }

    /// builder
    #[inline]
    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// builder
    #[inline]
    pub fn initial_state(mut self, state: GfxResourceState) -> Self {
        self.initial_state = state;
        self
    }
}

/// 设备纹理的 RAII 封装
pub struct GfxTexture {
    device: Rc<dyn GfxDevice>,
    handle: TextureHandle,
    desc: GfxTextureDesc,
}
impl Drop for GfxTexture {
    fn drop(&mut self) {
        self.device.destroy_texture(self.handle);
    }
}
// init
impl GfxTexture {
    pub fn new(device: &Rc<dyn GfxDevice>, desc: GfxTextureDesc) -> GfxResult<Self> {
        let handle = device.create_texture(&desc)?;
        Ok(Self {
            device: device.clone(),
            handle,
            desc,
        })
    }
}
// getter
impl GfxTexture {
    #[inline]
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.desc.name
    }
}
impl std::fmt::Debug for GfxTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxTexture").field("desc", &self.desc).finish()
    }
}
