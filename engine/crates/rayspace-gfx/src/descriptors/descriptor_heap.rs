use std::rc::Rc;

use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::resources::handles::DescriptorHeapHandle;
use crate::resources::views::GfxViewDescriptor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxDescriptorHeapDesc {
    pub count: u32,
    pub shader_visible: bool,
    pub name: String,
}

/// 描述符堆中某个槽位在 GPU 侧的位置
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxGpuDescriptorHandle {
    pub heap: DescriptorHeapHandle,
    pub offset: u32,
}

/// 可重建的描述符堆
///
/// 描述符堆无法原地扩容，[`Self::create`] 会新建一个堆并可选地把旧内容拷贝过去。
pub struct GfxDescriptorHeap {
    device: Rc<dyn GfxDevice>,
    handle: Option<DescriptorHeapHandle>,
    count: u32,
    shader_visible: bool,

    name: String,
}
impl Drop for GfxDescriptorHeap {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.destroy_descriptor_heap(handle);
        }
    }
}
// new & init
impl GfxDescriptorHeap {
    pub fn new(device: &Rc<dyn GfxDevice>, shader_visible: bool, name: impl Into<String>) -> Self {
        Self {
            device: device.clone(),
            handle: None,
            count: 0,
            shader_visible,
            name: name.into(),
        }
    }

    /// 以 `count` 个槽位重建堆
    ///
    /// `copy_existing` 时新容量不能小于旧容量，旧内容拷贝到新堆的相同位置。
    pub fn create(&mut self, count: u32, copy_existing: bool) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxDescriptorHeap::create");

        if copy_existing {
            assert!(
                count >= self.count,
                "descriptor heap '{}' cannot shrink from {} to {count} while copying",
                self.name,
                self.count
            );
        }

        let new_handle = self.device.create_descriptor_heap(&GfxDescriptorHeapDesc {
            count: count.max(1),
            shader_visible: self.shader_visible,
            name: self.name.clone(),
        })?;

        if let Some(old_handle) = self.handle.take() {
            if copy_existing && self.count > 0 {
                self.device.copy_descriptors(new_handle, 0, old_handle, 0, self.count);
            }
            self.device.destroy_descriptor_heap(old_handle);
        }

        log::debug!("descriptor heap '{}' created with {count} slots", self.name);
        self.handle = Some(new_handle);
        self.count = count;
        Ok(())
    }
}
// getter
impl GfxDescriptorHeap {
    #[inline]
    pub fn is_created(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn handle(&self) -> DescriptorHeapHandle {
        match self.handle {
            Some(handle) => handle,
            None => panic!("descriptor heap '{}' used before creation", self.name),
        }
    }

    #[inline]
    pub fn gpu_handle(&self, offset: u32) -> GfxGpuDescriptorHandle {
        assert!(self.shader_visible, "descriptor heap '{}' is not shader visible", self.name);
        assert!(
            offset <= self.count,
            "descriptor offset {offset} outside heap '{}' ({} slots)",
            self.name,
            self.count
        );
        GfxGpuDescriptorHandle {
            heap: self.handle(),
            offset,
        }
    }
}
// tools
impl GfxDescriptorHeap {
    #[inline]
    pub fn write(&self, offset: u32, view: &GfxViewDescriptor) {
        assert!(
            offset < self.count,
            "descriptor offset {offset} outside heap '{}' ({} slots)",
            self.name,
            self.count
        );
        self.device.write_descriptor(self.handle(), offset, view);
    }

    /// 把本堆 `[0, count)` 的内容整体拷到 `dst` 的 `dst_offset` 处
    pub fn copy_to(&self, dst: &GfxDescriptorHeap, dst_offset: u32) {
        assert!(
            dst_offset + self.count <= dst.count,
            "heap '{}' does not fit into '{}' at {dst_offset}",
            self.name,
            dst.name
        );
        if self.count > 0 {
            self.device.copy_descriptors(dst.handle(), dst_offset, self.handle(), 0, self.count);
        }
    }
}
