use slotmap::new_key_type;

new_key_type! {
    /// GPU Buffer
    pub struct BufferHandle;
    /// 2D 纹理（光追输出、渲染目标、深度）
    pub struct TextureHandle;
    /// 描述符堆
    pub struct DescriptorHeapHandle;
    /// 根签名
    pub struct RootSignatureHandle;
    /// 计算、光追或光栅管线
    pub struct PipelineHandle;
}

/// 屏障与拷贝命令的作用对象
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}
impl From<BufferHandle> for ResourceHandle {
    #[inline]
    fn from(value: BufferHandle) -> Self {
        Self::Buffer(value)
    }
}
impl From<TextureHandle> for ResourceHandle {
    #[inline]
    fn from(value: TextureHandle) -> Self {
        Self::Texture(value)
    }
}
