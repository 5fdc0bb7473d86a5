use ash::vk;
use rayspace_gfx::descriptors::root_signature::GfxDescriptorRangeType;
use rayspace_gfx::resources::views::GfxViewDescriptor;
use rayspace_utils::integer_set::IntegerSet;

use crate::shader_resources::description::ListHandle;

/// 描述符列表的内容提供方
///
/// 列表不持有描述符本身，每次需要写堆时从这里取。
pub trait DescriptorListSource {
    /// 列表需要的槽位数，即最大索引加一
    fn list_size(&self, list: ListHandle) -> u32;

    /// 索引处的描述符；空位返回 `None`
    fn list_descriptor(&self, list: ListHandle, index: u32) -> Option<GfxViewDescriptor>;

    /// 遍历列表中所有有效索引，用于扩容后的整体重建
    fn for_each_list_index(&self, list: ListHandle, f: &mut dyn FnMut(u32));
}

/// 不含任何外部列表时使用
pub struct NoDescriptorLists;
impl DescriptorListSource for NoDescriptorLists {
    fn list_size(&self, _list: ListHandle) -> u32 {
        0
    }

    fn list_descriptor(&self, _list: ListHandle, _index: u32) -> Option<GfxViewDescriptor> {
        None
    }

    fn for_each_list_index(&self, _list: ListHandle, _f: &mut dyn FnMut(u32)) {}
}

/// 描述符列表在全局堆中的状态
pub(crate) struct DescriptorList {
    pub handle: ListHandle,
    pub range_type: GfxDescriptorRangeType,
    /// 选择列表持有自己的描述符，外部列表为 `None`
    pub selection: Option<SelectionState>,

    /// 在全局堆中的起始位置
    pub offset: u32,
    /// 已分配的槽位数
    pub size: u32,
    pub dirty: IntegerSet,
}
impl DescriptorList {
    #[inline]
    pub fn is_selection(&self) -> bool {
        self.selection.is_some()
    }
}

pub(crate) struct SelectionState {
    pub window: u32,
    pub descriptors: Vec<GfxViewDescriptor>,
}

/// 待定的选择列表绑定
///
/// `bind` 时只记录根参数的位置；绘制前选定窗口后由
/// [`super::ShaderResources::resolve_pending_binds`] 落到命令列表上。
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingBind {
    pub list: ListHandle,
    pub bind_point: vk::PipelineBindPoint,
    pub parameter: u32,
    pub selection: Option<u32>,
}

/// 一次 [`super::ShaderResources::update`] 做了什么
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// 是否重建了全局堆
    pub resized: bool,
    /// 全局堆的槽位数
    pub heap_size: u32,
    pub descriptors_written: usize,
    pub tables_copied: usize,
    /// 整体重建过的列表
    pub rebuilt: Vec<ListHandle>,
    /// 按脏索引刷新的 `(列表, 索引)`
    pub refreshed: Vec<(ListHandle, u32)>,
}
