use std::rc::Rc;

use rayspace_gfx::basic::math::align_up;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::views::GfxConstantBufferView;

/// 常量 buffer 的大小需要按此对齐
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// CPU 可写的常量 buffer
///
/// 位于上传内存，写入后无需拷贝即可被着色器读取。
pub struct ShaderBuffer {
    buffer: GfxBuffer,
    /// 用户请求的字节数，未对齐
    size: u32,
}
// new & init
impl ShaderBuffer {
    pub fn new(device: &Rc<dyn GfxDevice>, size: u32, name: impl Into<String>) -> GfxResult<Self> {
        let aligned = align_up((size as u64).max(1), CONSTANT_BUFFER_ALIGNMENT);
        let buffer = GfxBuffer::new_upload(device, aligned, name)?;
        Ok(Self { buffer, size })
    }

    /// 以 `T` 的大小创建并写入初始值
    pub fn with_data<T: bytemuck::Pod>(device: &Rc<dyn GfxDevice>, data: &T, name: impl Into<String>) -> GfxResult<Self> {
        let buffer = Self::new(device, size_of::<T>() as u32, name)?;
        buffer.write(data)?;
        Ok(buffer)
    }
}
// getter
impl ShaderBuffer {
    #[inline]
    pub fn address(&self) -> ash::vk::DeviceAddress {
        self.buffer.device_address()
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn buffer(&self) -> &GfxBuffer {
        &self.buffer
    }

    /// 覆盖整个 buffer 的 CBV
    #[inline]
    pub fn descriptor(&self) -> GfxConstantBufferView {
        GfxConstantBufferView {
            address: self.buffer.device_address(),
            size: self.buffer.size() as u32,
        }
    }
}
// update
impl ShaderBuffer {
    pub fn write<T: bytemuck::Pod>(&self, data: &T) -> GfxResult<()> {
        self.write_bytes(bytemuck::bytes_of(data))
    }

    /// 宿主直接写入原始字节，长度不能超过创建时的大小
    pub fn write_bytes(&self, data: &[u8]) -> GfxResult<()> {
        assert!(
            data.len() <= self.size as usize,
            "{} bytes do not fit into shader buffer '{}' of {} bytes",
            data.len(),
            self.buffer.name(),
            self.size
        );
        self.buffer.write_bytes(0, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayspace_gfx::headless::HeadlessDevice;

    #[test]
    fn test_size_is_aligned_and_contents_written() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();

        let buffer = ShaderBuffer::with_data(&device, &[7u32, 9u32], "custom").unwrap();
        assert_eq!(buffer.size(), 8);
        assert_eq!(buffer.descriptor().size, 256);

        let bytes = headless.read_address(buffer.address(), 8).unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<[u32; 2]>(&bytes), [7, 9]);
    }

    #[test]
    #[should_panic(expected = "do not fit")]
    fn test_oversized_write_panics() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let buffer = ShaderBuffer::new(&device, 4, "small").unwrap();
        buffer.write(&[0u32; 2]).unwrap();
    }
}
