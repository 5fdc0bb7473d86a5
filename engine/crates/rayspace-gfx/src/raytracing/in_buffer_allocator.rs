use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use ash::vk;

use crate::basic::math::align_up;
use crate::commands::barrier::{GfxResourceBarrier, GfxResourceState};
use crate::commands::command_list::GfxCommandList;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::raytracing::acceleration::ACCELERATION_STRUCTURE_ALIGNMENT;
use crate::resources::buffer::GfxBuffer;
use crate::resources::handles::BufferHandle;

/// 共享 block 的大小
pub const BLOCK_SIZE: u64 = 64 * 1024;
/// 超过此大小的请求使用独立 buffer
pub const MAX_SHARED_SIZE: u64 = BLOCK_SIZE / 4;

/// 一个共享 block：一块 GPU buffer 加上其中的虚拟分配
struct AllocatorBlock {
    memory: GfxBuffer,
    /// offset -> size
    allocations: BTreeMap<u64, u64>,
    /// 不小于该值的请求必定失败，分配失败时降低，释放时重置
    limit: u64,
}
impl AllocatorBlock {
    fn allocate(&mut self, size: u64) -> Option<u64> {
        if size >= self.limit {
            return None;
        }

        let mut cursor = 0;
        for (&offset, &allocated) in &self.allocations {
            if offset - cursor >= size {
                break;
            }
            cursor = align_up(offset + allocated, ACCELERATION_STRUCTURE_ALIGNMENT);
        }

        if cursor + size > BLOCK_SIZE {
            self.limit = size;
            return None;
        }

        self.allocations.insert(cursor, size);
        Some(cursor)
    }
}

#[derive(Default)]
struct AllocatorState {
    blocks: Vec<AllocatorBlock>,
    first_free_block: usize,
}
impl AllocatorState {
    fn free(&mut self, block_index: usize, offset: u64) {
        let block = &mut self.blocks[block_index];
        let removed = block.allocations.remove(&offset);
        debug_assert!(removed.is_some(), "double free in block {block_index} at {offset}");

        block.limit = BLOCK_SIZE;
        self.first_free_block = self.first_free_block.min(block_index);
    }
}

enum Backing {
    Dedicated(GfxBuffer),
    Shared {
        state: Rc<RefCell<AllocatorState>>,
        block: usize,
        offset: u64,
    },
}

/// 分配器给出的一段 GPU 内存，drop 时自动归还
pub struct GfxAddressableBuffer {
    address: vk::DeviceAddress,
    size: u64,
    backing: Backing,
}
impl Drop for GfxAddressableBuffer {
    fn drop(&mut self) {
        if let Backing::Shared { state, block, offset } = &self.backing {
            state.borrow_mut().free(*block, *offset);
        }
    }
}
impl GfxAddressableBuffer {
    #[inline]
    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 独立分配时对应的 buffer；共享分配返回 `None`
    #[inline]
    pub fn resource(&self) -> Option<BufferHandle> {
        match &self.backing {
            Backing::Dedicated(buffer) => Some(buffer.handle()),
            Backing::Shared { .. } => None,
        }
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        matches!(self.backing, Backing::Shared { .. })
    }
}
impl std::fmt::Debug for GfxAddressableBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxAddressableBuffer")
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &self.size)
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// 把大量小的加速结构放进少数几块大 buffer
///
/// 分配按 256 字节对齐，从 `first_free_block` 开始首次适配；
/// 超过四分之一 block 的请求直接创建独立 buffer。只能在录制线程上使用。
pub struct GfxInBufferAllocator {
    device: Rc<dyn GfxDevice>,
    state: GfxResourceState,
    name: String,

    inner: Rc<RefCell<AllocatorState>>,
}
// new & init
impl GfxInBufferAllocator {
    pub fn new(device: &Rc<dyn GfxDevice>, state: GfxResourceState, name: impl Into<String>) -> Self {
        Self {
            device: device.clone(),
            state,
            name: name.into(),
            inner: Rc::new(RefCell::new(AllocatorState::default())),
        }
    }
}
// getter
impl GfxInBufferAllocator {
    #[inline]
    pub fn block_count(&self) -> usize {
        self.inner.borrow().blocks.len()
    }
}
// update
impl GfxInBufferAllocator {
    pub fn allocate(&self, size: u64) -> GfxResult<GfxAddressableBuffer> {
        let _span = tracy_client::span!("GfxInBufferAllocator::allocate");

        if size > MAX_SHARED_SIZE {
            let buffer = self.allocate_memory(size, &format!("{}-dedicated", self.name))?;
            return Ok(GfxAddressableBuffer {
                address: buffer.device_address(),
                size,
                backing: Backing::Dedicated(buffer),
            });
        }

        let size = align_up(size.max(1), ACCELERATION_STRUCTURE_ALIGNMENT);
        let mut state = self.inner.borrow_mut();

        while state.first_free_block < state.blocks.len() {
            let index = state.first_free_block;
            if let Some(offset) = state.blocks[index].allocate(size) {
                let address = state.blocks[index].memory.device_address() + offset;
                return Ok(self.shared(index, offset, address, size));
            }
            state.first_free_block += 1;
        }

        let index = state.blocks.len();
        let memory = self.allocate_memory(BLOCK_SIZE, &format!("{}-block-{index}", self.name))?;
        log::debug!("in-buffer allocator '{}' grows to {} blocks", self.name, index + 1);
        state.blocks.push(AllocatorBlock {
            memory,
            allocations: BTreeMap::new(),
            limit: BLOCK_SIZE,
        });

        let Some(offset) = state.blocks[index].allocate(size) else {
            panic!("fresh block cannot hold {size} bytes");
        };
        let address = state.blocks[index].memory.device_address() + offset;
        Ok(self.shared(index, offset, address, size))
    }

    /// 为 `resources` 与所有共享 block 录制 UAV 屏障
    pub fn create_barriers(&self, cmd: &mut dyn GfxCommandList, resources: &[BufferHandle]) {
        let state = self.inner.borrow();
        let barriers = resources
            .iter()
            .copied()
            .chain(state.blocks.iter().map(|block| block.memory.handle()))
            .map(GfxResourceBarrier::uav)
            .collect::<Vec<_>>();

        if !barriers.is_empty() {
            cmd.resource_barriers(&barriers);
        }
    }
}
// tools
impl GfxInBufferAllocator {
    fn allocate_memory(&self, size: u64, name: &str) -> GfxResult<GfxBuffer> {
        GfxBuffer::new_device_local(&self.device, size, self.state, name)
    }

    fn shared(&self, block: usize, offset: u64, address: vk::DeviceAddress, size: u64) -> GfxAddressableBuffer {
        GfxAddressableBuffer {
            address,
            size,
            backing: Backing::Shared {
                state: self.inner.clone(),
                block,
                offset,
            },
        }
    }
}
