use std::rc::Rc;

use ash::vk;

use crate::basic::bytes::BytesConvert;
use crate::commands::barrier::GfxResourceState;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::resources::handles::BufferHandle;

/// Buffer 所在的内存
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxMemoryLocation {
    /// 只允许 GPU 访问
    GpuOnly,
    /// CPU 可写的上传内存
    CpuToGpu,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: GfxMemoryLocation,
    pub initial_state: GfxResourceState,
    pub name: String,
}
impl GfxBufferDesc {
    /// 上传 buffer：CPU 可写，常驻 GENERIC_READ
    pub fn upload(size: vk::DeviceSize, name: impl Into<String>) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            location: GfxMemoryLocation::CpuToGpu,
            initial_state: GfxResourceState::GENERIC_READ,
            name: name.into(),
        }
    }

    /// GPU 侧 buffer，允许无序访问
    pub fn device_local(size: vk::DeviceSize, initial_state: GfxResourceState, name: impl Into<String>) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            location: GfxMemoryLocation::GpuOnly,
            initial_state,
            name: name.into(),
        }
    }

    /// builder
    #[inline]
    pub fn usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }
}

/// 设备 buffer 的 RAII 封装
///
/// drop 时归还给创建它的设备。
pub struct GfxBuffer {
    device: Rc<dyn GfxDevice>,
    handle: BufferHandle,

    size: vk::DeviceSize,
    device_addr: vk::DeviceAddress,
    location: GfxMemoryLocation,

    debug_name: String,
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
    }
}
// init & destroy
impl GfxBuffer {
    pub fn new(device: &Rc<dyn GfxDevice>, desc: &GfxBufferDesc) -> GfxResult<Self> {
        let (handle, device_addr) = device.create_buffer(desc)?;
        Ok(Self {
            device: device.clone(),
            handle,
            size: desc.size,
            device_addr,
            location: desc.location,
            debug_name: desc.name.clone(),
        })
    }

    #[inline]
    pub fn new_upload(device: &Rc<dyn GfxDevice>, size: vk::DeviceSize, name: impl Into<String>) -> GfxResult<Self> {
        Self::new(device, &GfxBufferDesc::upload(size, name))
    }

    #[inline]
    pub fn new_device_local(
        device: &Rc<dyn GfxDevice>,
        size: vk::DeviceSize,
        initial_state: GfxResourceState,
        name: impl Into<String>,
    ) -> GfxResult<Self> {
        Self::new(device, &GfxBufferDesc::device_local(size, initial_state, name))
    }

    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// getter
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_addr
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }
}
// tools
impl GfxBuffer {
    /// 写入上传 buffer；只能用于 [`GfxMemoryLocation::CpuToGpu`]
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        assert_eq!(
            self.location,
            GfxMemoryLocation::CpuToGpu,
            "buffer '{}' is not CPU writable",
            self.debug_name
        );
        assert!(
            offset + data.len() as vk::DeviceSize <= self.size,
            "write of {} bytes at {offset} overflows buffer '{}' ({} bytes)",
            data.len(),
            self.debug_name,
            self.size
        );
        self.device.write_buffer(self.handle, offset, data)
    }

    #[inline]
    pub fn write<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &T) -> GfxResult<()> {
        self.write_bytes(offset, BytesConvert::bytes_of(data))
    }

    #[inline]
    pub fn write_slice<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> GfxResult<()> {
        self.write_bytes(offset, BytesConvert::bytes_of_slice(data))
    }
}
impl std::fmt::Debug for GfxBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxBuffer")
            .field("name", &self.debug_name)
            .field("size", &self.size)
            .field("address", &format_args!("{:#x}", self.device_addr))
            .finish()
    }
}
