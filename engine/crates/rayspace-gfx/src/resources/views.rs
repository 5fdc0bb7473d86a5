use ash::vk;

use crate::resources::handles::{BufferHandle, TextureHandle};

/// 写入描述符堆的一个视图
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxViewDescriptor {
    ConstantBuffer(GfxConstantBufferView),
    ShaderResource(GfxShaderResourceView),
    UnorderedAccess(GfxUnorderedAccessView),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxConstantBufferView {
    pub address: vk::DeviceAddress,
    /// 字节数，需要按 256 对齐
    pub size: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxShaderResourceView {
    Buffer {
        buffer: BufferHandle,
        first_element: u64,
        element_count: u32,
        stride: u32,
    },
    Texture2D {
        texture: TextureHandle,
        format: vk::Format,
        mip_levels: u32,
    },
    AccelerationStructure {
        address: vk::DeviceAddress,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxUnorderedAccessView {
    Buffer {
        buffer: BufferHandle,
        first_element: u64,
        element_count: u32,
        stride: u32,
    },
    Texture2D {
        texture: TextureHandle,
        format: vk::Format,
    },
}

impl From<GfxConstantBufferView> for GfxViewDescriptor {
    #[inline]
    fn from(value: GfxConstantBufferView) -> Self {
        Self::ConstantBuffer(value)
    }
}
impl From<GfxShaderResourceView> for GfxViewDescriptor {
    #[inline]
    fn from(value: GfxShaderResourceView) -> Self {
        Self::ShaderResource(value)
    }
}
impl From<GfxUnorderedAccessView> for GfxViewDescriptor {
    #[inline]
    fn from(value: GfxUnorderedAccessView) -> Self {
        Self::UnorderedAccess(value)
    }
}

/// 顶点缓冲绑定
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxVertexBufferView {
    pub address: vk::DeviceAddress,
    pub size: u32,
    pub stride: u32,
}
