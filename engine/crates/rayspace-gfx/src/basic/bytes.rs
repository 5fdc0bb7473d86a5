/// 把 CPU 侧的 `Pod` 数据视为字节，用于写入上传 buffer
pub struct BytesConvert {}
impl BytesConvert {
    #[inline]
    pub fn bytes_of<T: bytemuck::Pod>(data: &T) -> &[u8] {
        bytemuck::bytes_of(data)
    }

    #[inline]
    pub fn bytes_of_slice<T: bytemuck::Pod>(data: &[T]) -> &[u8] {
        bytemuck::cast_slice(data)
    }
}
