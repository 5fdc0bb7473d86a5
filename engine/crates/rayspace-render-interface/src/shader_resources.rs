//! 着色器资源绑定
//!
//! 图形与计算两个根签名共用一个 GPU 可见的描述符堆：
//!
//! ```text
//! | table 0 | table 1 | ... | list 0 (size) | list 1 (size) | ... |
//! ```
//!
//! 描述符表大小固定，放在堆的开头；描述符列表按需翻倍扩容，扩容时整个堆重建，
//! 从第一个扩容的列表开始全部重写。

pub mod description;
pub mod list;

use std::rc::Rc;

use ash::vk;
use rayspace_gfx::commands::command_list::{GfxCommandList, GfxRootViewKind};
use rayspace_gfx::descriptors::descriptor_heap::GfxDescriptorHeap;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::resources::handles::{DescriptorHeapHandle, RootSignatureHandle};
use rayspace_gfx::resources::views::{
    GfxConstantBufferView, GfxShaderResourceView, GfxUnorderedAccessView, GfxViewDescriptor,
};
use rayspace_utils::integer_set::IntegerSet;
use rayspace_utils::stable_index::StableIndex;

pub use description::{
    ConstantHandle, DescriptorKind, Description, ListHandle, SelectionList, Table, TableEntry, TableHandle,
};
pub use list::{DescriptorListSource, NoDescriptorLists, PendingBind, UpdateReport};

use description::{RootParameter, TableLayout};
use list::{DescriptorList, SelectionState};

/// 列表首次分配以及扩容时的最小槽位数
const MIN_LIST_SIZE: u32 = 4;

struct DescriptorTable {
    layout: TableLayout,
    /// 表自己的 CPU 堆，全局堆重建时从这里拷贝
    heap: GfxDescriptorHeap,
    /// 在全局堆中的起始位置
    external_offset: u32,
}

pub struct ShaderResources {
    graphics_root_signature: RootSignatureHandle,
    compute_root_signature: RootSignatureHandle,

    /// 全局根参数序号：先图形后计算
    parameters: Vec<RootParameter>,
    graphics_parameter_count: u32,

    constants: Vec<u32>,
    /// 每个常量所在的全局根参数序号
    constant_parameters: Vec<u32>,

    tables: Vec<DescriptorTable>,
    table_descriptor_count: u32,
    lists: Vec<DescriptorList>,

    cpu_heap: GfxDescriptorHeap,
    gpu_heap: GfxDescriptorHeap,
    cpu_heap_dirty: bool,

    pending_binds: Vec<PendingBind>,

    name: String,
}
// new & init
impl ShaderResources {
    /// 分别描述图形与计算根签名，创建根签名以及每个描述符表的 CPU 堆
    ///
    /// 全局堆在第一次 [`Self::update`] 时创建。
    pub fn new(
        device: &Rc<dyn GfxDevice>,
        name: impl Into<String>,
        graphics: impl FnOnce(&mut Description),
        compute: impl FnOnce(&mut Description),
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("ShaderResources::new");
        let name = name.into();

        let mut graphics_desc = Description::new(0, 0, &format!("{name}-graphics"));
        graphics(&mut graphics_desc);
        let graphics_parameter_count = graphics_desc.parameters.len() as u32;
        let mut compute_desc =
            Description::new(graphics_parameter_count, graphics_desc.constant_count, &format!("{name}-compute"));
        compute(&mut compute_desc);

        let graphics_root_signature = device.create_root_signature(&graphics_desc.root_signature)?;
        let compute_root_signature = device.create_root_signature(&compute_desc.root_signature)?;

        // 计算侧的表与列表序号排在图形侧之后
        let graphics_table_count = graphics_desc.tables.len() as u32;
        let graphics_list_count = graphics_desc.lists.len() as u32;
        let parameters: Vec<RootParameter> = graphics_desc
            .parameters
            .iter()
            .copied()
            .chain(compute_desc.parameters.iter().map(|parameter| match *parameter {
                RootParameter::DescriptorTable { table } => RootParameter::DescriptorTable {
                    table: table + graphics_table_count,
                },
                RootParameter::DescriptorList { list } => RootParameter::DescriptorList {
                    list: list + graphics_list_count,
                },
                other => other,
            }))
            .collect();

        let constant_count = (graphics_desc.constant_count + compute_desc.constant_count) as usize;
        let mut constant_parameters = vec![0; constant_count];
        let mut list_handles = Vec::new();
        for (parameter_index, parameter) in parameters.iter().enumerate() {
            match parameter {
                RootParameter::Constant { index } => constant_parameters[*index as usize] = parameter_index as u32,
                RootParameter::DescriptorList { .. } => list_handles.push(ListHandle(parameter_index as u32)),
                _ => {}
            }
        }

        let mut tables = Vec::new();
        let mut table_descriptor_count = 0;
        for (index, layout) in graphics_desc.tables.into_iter().chain(compute_desc.tables).enumerate() {
            let size = layout.offsets.last().copied().unwrap_or(0);
            let mut heap = GfxDescriptorHeap::new(device, false, format!("{name}-table-{index}"));
            heap.create(size, false)?;
            tables.push(DescriptorTable {
                layout,
                heap,
                external_offset: table_descriptor_count,
            });
            table_descriptor_count += size;
        }

        let lists = graphics_desc
            .lists
            .into_iter()
            .chain(compute_desc.lists)
            .zip(list_handles)
            .map(|(desc, handle)| DescriptorList {
                handle,
                range_type: desc.range_type,
                selection: desc.selection_window.map(|window| SelectionState {
                    window,
                    descriptors: Vec::new(),
                }),
                offset: 0,
                size: 0,
                dirty: IntegerSet::new(),
            })
            .collect();

        log::info!(
            "shader resources '{name}' created: {} parameters, {} tables ({table_descriptor_count} descriptors)",
            parameters.len(),
            tables.len()
        );

        Ok(Self {
            graphics_root_signature,
            compute_root_signature,
            parameters,
            graphics_parameter_count,
            constants: vec![0; constant_count],
            constant_parameters,
            tables,
            table_descriptor_count,
            lists,
            cpu_heap: GfxDescriptorHeap::new(device, false, format!("{name}-cpu")),
            gpu_heap: GfxDescriptorHeap::new(device, true, format!("{name}-gpu")),
            cpu_heap_dirty: false,
            pending_binds: Vec::new(),
            name,
        })
    }
}
// getter
impl ShaderResources {
    #[inline]
    pub fn graphics_root_signature(&self) -> RootSignatureHandle {
        self.graphics_root_signature
    }

    #[inline]
    pub fn compute_root_signature(&self) -> RootSignatureHandle {
        self.compute_root_signature
    }

    /// 全局堆的槽位数，尚未创建时为 0
    #[inline]
    pub fn heap_size(&self) -> u32 {
        self.cpu_heap.count()
    }

    /// GPU 可见的全局堆
    #[inline]
    pub fn descriptor_heap(&self) -> DescriptorHeapHandle {
        self.gpu_heap.handle()
    }

    /// 列表已分配的槽位数，只增不减
    pub fn list_capacity(&self, list: ListHandle) -> u32 {
        self.lists[self.list_index(list)].size
    }

    /// 列表在全局堆中的起始位置
    pub fn list_offset(&self, list: ListHandle) -> u32 {
        self.lists[self.list_index(list)].offset
    }

    #[inline]
    pub fn pending_binds(&self) -> &[PendingBind] {
        &self.pending_binds
    }

    #[inline]
    pub fn constant(&self, constant: ConstantHandle) -> u32 {
        self.constants[constant.0 as usize]
    }
}
// update
impl ShaderResources {
    pub fn create_constant_buffer_view(&mut self, entry: TableEntry, offset: u32, view: GfxConstantBufferView) {
        self.create_view(entry, offset, view)
    }

    pub fn create_shader_resource_view(&mut self, entry: TableEntry, offset: u32, view: GfxShaderResourceView) {
        self.create_view(entry, offset, view)
    }

    pub fn create_unordered_access_view(&mut self, entry: TableEntry, offset: u32, view: GfxUnorderedAccessView) {
        self.create_view(entry, offset, view)
    }

    /// 修改根常量，下一次 [`Self::bind`] 生效
    #[inline]
    pub fn set_constant(&mut self, constant: ConstantHandle, value: u32) {
        self.constants[constant.0 as usize] = value;
    }

    /// 修改根常量并立即写入命令列表
    pub fn update_constant(&mut self, cmd: &mut dyn GfxCommandList, constant: ConstantHandle, value: u32) {
        self.set_constant(constant, value);
        let (bind_point, slot) = self.slot_of(self.constant_parameters[constant.0 as usize]);
        cmd.set_root_constant(bind_point, slot, value);
    }

    /// 下一次 [`Self::update`] 时重写这些索引处的描述符
    pub fn request_list_refresh<I: StableIndex>(&mut self, list: ListHandle, indices: &IntegerSet<I>) {
        let list_index = self.list_index(list);
        self.lists[list_index].dirty.union_with(&indices.cast());
    }

    /// 替换选择列表的全部内容
    pub fn set_selection_list_content<D: DescriptorKind>(&mut self, list: &SelectionList<D>, descriptors: &[D]) {
        let list_index = self.list_index(list.handle);
        let state = &mut self.lists[list_index];
        debug_assert_eq!(state.range_type, D::RANGE_TYPE);
        let Some(selection) = state.selection.as_mut() else {
            panic!("list {:?} is not a selection list", list.handle);
        };
        assert!(
            descriptors.len() as u32 >= selection.window,
            "selection list {:?} needs at least {} descriptors, got {}",
            list.handle,
            selection.window,
            descriptors.len()
        );
        selection.descriptors = descriptors.iter().cloned().map(Into::into).collect();
        state.dirty = IntegerSet::full(descriptors.len());
    }

    /// 同步列表大小与脏索引
    ///
    /// 有列表需要扩容时重建全局堆，并从第一个扩容的列表开始整体重写；
    /// 其余列表只重写脏索引。
    pub fn update(&mut self, source: &dyn DescriptorListSource) -> GfxResult<UpdateReport> {
        let _span = tracy_client::span!("ShaderResources::update");
        let mut report = UpdateReport::default();

        let mut first_resized = None;
        for (list_index, list) in self.lists.iter_mut().enumerate() {
            let required = match &list.selection {
                Some(selection) => selection.descriptors.len() as u32,
                None => source.list_size(list.handle),
            };
            if list.size != 0 && list.size >= required {
                continue;
            }

            let mut size = list.size;
            loop {
                size = (size * 2).max(MIN_LIST_SIZE);
                if size >= required {
                    break;
                }
            }
            log::debug!(
                "{:?} list {:?} of '{}' grows {} -> {size} (requires {required})",
                list.range_type,
                list.handle,
                self.name,
                list.size
            );
            list.size = size;
            first_resized.get_or_insert(list_index);
        }

        let rebuild_from = match first_resized {
            Some(first) => Some(first),
            None if !self.cpu_heap.is_created() => Some(self.lists.len()),
            None => None,
        };
        if let Some(first) = rebuild_from {
            self.perform_size_update(first, source, &mut report)?;
        }

        for list_index in 0..rebuild_from.unwrap_or(self.lists.len()) {
            self.refresh_dirty_entries(list_index, source, &mut report);
        }

        report.heap_size = self.cpu_heap.count();
        Ok(report)
    }

    /// 设置根签名、描述符堆与全部根参数
    ///
    /// 选择列表只登记一条 [`PendingBind`]，窗口位置在绘制前确定。
    pub fn bind(&mut self, cmd: &mut dyn GfxCommandList) {
        let _span = tracy_client::span!("ShaderResources::bind");
        assert!(
            self.gpu_heap.is_created(),
            "shader resources '{}' bound before the first update",
            self.name
        );

        if self.cpu_heap_dirty {
            self.cpu_heap.copy_to(&self.gpu_heap, 0);
            self.cpu_heap_dirty = false;
        }

        cmd.set_root_signature(vk::PipelineBindPoint::GRAPHICS, self.graphics_root_signature);
        cmd.set_root_signature(vk::PipelineBindPoint::COMPUTE, self.compute_root_signature);
        cmd.set_descriptor_heap(self.gpu_heap.handle());

        self.pending_binds.clear();
        for parameter in 0..self.parameters.len() as u32 {
            self.bind_parameter(cmd, parameter);
        }
    }

    /// 选定选择列表的窗口起点，需要先 [`Self::bind`]
    pub fn bind_selection_list_index<D: DescriptorKind>(&mut self, list: &SelectionList<D>, index: u32) {
        let list_index = self.list_index(list.handle);
        let Some(selection) = self.lists[list_index].selection.as_ref() else {
            panic!("list {:?} is not a selection list", list.handle);
        };
        let count = selection.descriptors.len() as u32;
        assert!(
            index + selection.window <= count,
            "selection window {index}..{} outside list {:?} with {count} descriptors",
            index + selection.window,
            list.handle
        );

        let Some(pending) = self.pending_binds.iter_mut().find(|pending| pending.list == list.handle) else {
            panic!("selection list {:?} selected before bind", list.handle);
        };
        pending.selection = Some(index);
    }

    /// 把已选定窗口的选择列表写入命令列表
    pub fn resolve_pending_binds(&self, cmd: &mut dyn GfxCommandList) {
        for pending in &self.pending_binds {
            let Some(selection) = pending.selection else {
                continue;
            };
            let offset = self.list_offset(pending.list) + selection;
            cmd.set_root_descriptor_table(pending.bind_point, pending.parameter, self.gpu_heap.gpu_handle(offset));
        }
    }
}
// tools
impl ShaderResources {
    fn create_view<D: DescriptorKind>(&mut self, entry: TableEntry, offset: u32, view: D) {
        let table_index = match self.parameters.get(entry.parameter as usize) {
            Some(RootParameter::DescriptorTable { table }) => *table as usize,
            _ => panic!("root parameter {} of '{}' is not a descriptor table", entry.parameter, self.name),
        };

        let table = &self.tables[table_index];
        let range = entry.in_heap_index as usize;
        assert_eq!(
            table.layout.range_types[range],
            D::RANGE_TYPE,
            "descriptor type does not match the table entry"
        );
        let begin = table.layout.offsets[range];
        let end = table.layout.offsets[range + 1];
        assert!(
            offset < end - begin,
            "offset {offset} outside table entry of {} descriptors",
            end - begin
        );

        let view: GfxViewDescriptor = view.into();
        let slot = begin + offset;
        table.heap.write(slot, &view);

        // 表的内容直接写穿到全局堆，绑定之后写入的视图同一帧内也可见
        if self.cpu_heap.is_created() {
            self.cpu_heap.write(table.external_offset + slot, &view);
            self.gpu_heap.write(table.external_offset + slot, &view);
        }
    }

    fn perform_size_update(
        &mut self,
        first: usize,
        source: &dyn DescriptorListSource,
        report: &mut UpdateReport,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("ShaderResources::perform_size_update");

        let total = self.table_descriptor_count + self.lists.iter().map(|list| list.size).sum::<u32>();
        self.cpu_heap.create(total, true)?;
        self.gpu_heap.create(total, false)?;
        self.cpu_heap_dirty = true;
        report.resized = true;
        log::debug!("shader resources '{}' heap rebuilt with {total} descriptors", self.name);

        for table in &self.tables {
            table.heap.copy_to(&self.cpu_heap, table.external_offset);
            report.tables_copied += 1;
        }

        let mut offset = self.table_descriptor_count;
        for list in &mut self.lists {
            list.offset = offset;
            offset += list.size;
        }

        for list_index in first..self.lists.len() {
            self.rebuild_list(list_index, source, report);
        }
        Ok(())
    }

    fn rebuild_list(&mut self, list_index: usize, source: &dyn DescriptorListSource, report: &mut UpdateReport) {
        let Self { lists, cpu_heap, .. } = self;
        let list = &mut lists[list_index];
        list.dirty.clear();

        let (handle, base, size) = (list.handle, list.offset, list.size);
        match &list.selection {
            Some(selection) => {
                for (index, descriptor) in selection.descriptors.iter().enumerate() {
                    cpu_heap.write(base + index as u32, descriptor);
                    report.descriptors_written += 1;
                }
            }
            None => {
                let mut written = 0;
                source.for_each_list_index(handle, &mut |index| {
                    assert!(index < size, "list {handle:?} index {index} outside capacity {size}");
                    if let Some(descriptor) = source.list_descriptor(handle, index) {
                        cpu_heap.write(base + index, &descriptor);
                        written += 1;
                    }
                });
                report.descriptors_written += written;
            }
        }
        report.rebuilt.push(handle);
    }

    fn refresh_dirty_entries(
        &mut self,
        list_index: usize,
        source: &dyn DescriptorListSource,
        report: &mut UpdateReport,
    ) {
        let list = &mut self.lists[list_index];
        if list.dirty.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut list.dirty);

        for index in dirty.iter() {
            let index = index as u32;
            assert!(
                index < list.size,
                "list {:?} index {index} outside capacity {}",
                list.handle,
                list.size
            );
            let descriptor = match &list.selection {
                Some(selection) => selection.descriptors.get(index as usize).cloned(),
                None => source.list_descriptor(list.handle, index),
            };
            let Some(descriptor) = descriptor else {
                continue;
            };

            self.cpu_heap.write(list.offset + index, &descriptor);
            self.cpu_heap_dirty = true;
            report.descriptors_written += 1;
            report.refreshed.push((list.handle, index));
        }
    }

    fn bind_parameter(&mut self, cmd: &mut dyn GfxCommandList, parameter: u32) {
        let (bind_point, slot) = self.slot_of(parameter);
        match self.parameters[parameter as usize] {
            RootParameter::Constant { index } => {
                cmd.set_root_constant(bind_point, slot, self.constants[index as usize]);
            }
            RootParameter::ConstantBufferView { address } => {
                cmd.set_root_view(bind_point, slot, GfxRootViewKind::ConstantBuffer, address);
            }
            RootParameter::ShaderResourceView { address } => {
                cmd.set_root_view(bind_point, slot, GfxRootViewKind::ShaderResource, address);
            }
            RootParameter::UnorderedAccessView { address } => {
                cmd.set_root_view(bind_point, slot, GfxRootViewKind::UnorderedAccess, address);
            }
            RootParameter::DescriptorTable { table } => {
                let offset = self.tables[table as usize].external_offset;
                cmd.set_root_descriptor_table(bind_point, slot, self.gpu_heap.gpu_handle(offset));
            }
            RootParameter::DescriptorList { list } => {
                let list = &self.lists[list as usize];
                if list.is_selection() {
                    self.pending_binds.push(PendingBind {
                        list: list.handle,
                        bind_point,
                        parameter: slot,
                        selection: None,
                    });
                } else {
                    cmd.set_root_descriptor_table(bind_point, slot, self.gpu_heap.gpu_handle(list.offset));
                }
            }
        }
    }

    /// 全局根参数序号对应的绑定点与根签名内的位置
    #[inline]
    fn slot_of(&self, parameter: u32) -> (vk::PipelineBindPoint, u32) {
        if parameter < self.graphics_parameter_count {
            (vk::PipelineBindPoint::GRAPHICS, parameter)
        } else {
            (vk::PipelineBindPoint::COMPUTE, parameter - self.graphics_parameter_count)
        }
    }

    fn list_index(&self, list: ListHandle) -> usize {
        match self.parameters.get(list.0 as usize) {
            Some(RootParameter::DescriptorList { list }) => *list as usize,
            _ => panic!("{list:?} is not a descriptor list of '{}'", self.name),
        }
    }
}
impl std::fmt::Debug for ShaderResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderResources")
            .field("name", &self.name)
            .field("parameters", &self.parameters.len())
            .field("tables", &self.tables.len())
            .field("lists", &self.lists.len())
            .field("heap_size", &self.heap_size())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rayspace_crate_tools::init_log::init_test_log;
    use rayspace_gfx::descriptors::descriptor_heap::GfxGpuDescriptorHandle;
    use rayspace_gfx::descriptors::root_signature::GfxShaderLocation;
    use rayspace_gfx::headless::{HeadlessDevice, RecordedCommand};

    use super::*;

    #[derive(Default)]
    struct VecSource {
        entries: HashMap<ListHandle, Vec<Option<GfxViewDescriptor>>>,
    }
    impl DescriptorListSource for VecSource {
        fn list_size(&self, list: ListHandle) -> u32 {
            self.entries.get(&list).map_or(0, |entries| entries.len() as u32)
        }

        fn list_descriptor(&self, list: ListHandle, index: u32) -> Option<GfxViewDescriptor> {
            self.entries.get(&list)?.get(index as usize)?.clone()
        }

        fn for_each_list_index(&self, list: ListHandle, f: &mut dyn FnMut(u32)) {
            let Some(entries) = self.entries.get(&list) else {
                return;
            };
            for (index, entry) in entries.iter().enumerate() {
                if entry.is_some() {
                    f(index as u32);
                }
            }
        }
    }

    fn cbv(seed: u64) -> GfxConstantBufferView {
        GfxConstantBufferView {
            address: 0x10_0000 + seed * 256,
            size: 256,
        }
    }

    struct Fixture {
        headless: Rc<HeadlessDevice>,
        device: Rc<dyn GfxDevice>,
        resources: ShaderResources,
        constant: ConstantHandle,
        selection: SelectionList<GfxConstantBufferView>,
        table_entry: TableEntry,
        instance_list: ListHandle,
    }

    fn fixture() -> Fixture {
        init_test_log();
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();

        let mut constant = None;
        let mut selection = None;
        let mut table_entry = None;
        let mut instance_list = None;
        let resources = ShaderResources::new(
            &device,
            "test",
            |graphics| {
                constant = Some(graphics.add_root_constant(GfxShaderLocation::new(0, 0)));
                selection =
                    Some(graphics.add_constant_buffer_view_descriptor_selection_list(GfxShaderLocation::new(1, 0), 1));
                graphics.enable_input_assembler();
            },
            |compute| {
                compute.add_constant_buffer_view(0xabc00, GfxShaderLocation::new(0, 0));
                compute.add_heap_descriptor_table(|table| {
                    table_entry = Some(table.add_shader_resource_view(GfxShaderLocation::new(0, 0), 2));
                });
                instance_list = Some(compute.add_constant_buffer_view_descriptor_list(GfxShaderLocation::new(4, 0)));
            },
        )
        .unwrap();

        Fixture {
            headless,
            device,
            resources,
            constant: constant.unwrap(),
            selection: selection.unwrap(),
            table_entry: table_entry.unwrap(),
            instance_list: instance_list.unwrap(),
        }
    }

    fn source_with(list: ListHandle, count: u64) -> VecSource {
        let mut source = VecSource::default();
        source.entries.insert(list, (0..count).map(|seed| Some(cbv(seed).into())).collect());
        source
    }

    #[test]
    fn test_root_signatures_follow_description() {
        let f = fixture();
        let graphics = f.headless.root_signature_desc(f.resources.graphics_root_signature()).unwrap();
        let compute = f.headless.root_signature_desc(f.resources.compute_root_signature()).unwrap();

        assert!(graphics.allow_input_assembler);
        assert_eq!(graphics.parameters.len(), 2);
        assert!(!compute.allow_input_assembler);
        assert_eq!(compute.parameters.len(), 3);
        assert_eq!(f.instance_list, ListHandle(4));
    }

    #[test]
    fn test_second_update_without_changes_is_idempotent() {
        let mut f = fixture();
        let source = source_with(f.instance_list, 3);

        let first = f.resources.update(&source).unwrap();
        assert!(first.resized);
        // 表 2 个槽位，两个列表各 4 个
        assert_eq!(first.heap_size, 10);
        assert_eq!(first.tables_copied, 1);
        assert_eq!(first.descriptors_written, 3);

        let stats = f.headless.stats();
        let second = f.resources.update(&source).unwrap();
        assert_eq!(
            second,
            UpdateReport {
                heap_size: 10,
                ..Default::default()
            }
        );
        assert_eq!(f.headless.stats().heaps_created, stats.heaps_created);
        assert_eq!(f.headless.stats().descriptor_writes, stats.descriptor_writes);
    }

    #[test]
    fn test_list_capacity_never_shrinks() {
        let mut f = fixture();
        f.resources.update(&source_with(f.instance_list, 3)).unwrap();
        assert_eq!(f.resources.list_capacity(f.instance_list), 4);

        let grown = f.resources.update(&source_with(f.instance_list, 5)).unwrap();
        assert!(grown.resized);
        assert_eq!(grown.rebuilt, vec![f.instance_list]);
        assert_eq!(grown.descriptors_written, 5);
        assert_eq!(f.resources.list_capacity(f.instance_list), 8);

        let shrunk = f.resources.update(&source_with(f.instance_list, 2)).unwrap();
        assert!(!shrunk.resized);
        assert_eq!(f.resources.list_capacity(f.instance_list), 8);

        f.resources.update(&source_with(f.instance_list, 17)).unwrap();
        assert_eq!(f.resources.list_capacity(f.instance_list), 32);
        assert_eq!(f.resources.heap_size(), 2 + 4 + 32);
    }

    #[test]
    fn test_refresh_rewrites_only_requested_indices() {
        let mut f = fixture();
        let mut source = source_with(f.instance_list, 3);
        f.resources.update(&source).unwrap();

        source.entries.get_mut(&f.instance_list).unwrap()[1] = Some(cbv(42).into());
        let dirty: IntegerSet = [1usize].into_iter().collect();
        f.resources.request_list_refresh(f.instance_list, &dirty);
        // 重复请求会合并而不是覆盖
        f.resources.request_list_refresh(f.instance_list, &dirty);

        let report = f.resources.update(&source).unwrap();
        assert!(!report.resized);
        assert_eq!(report.descriptors_written, 1);
        assert_eq!(report.refreshed, vec![(f.instance_list, 1)]);

        let mut cmd = f.device.create_command_list(2, "cmd").unwrap();
        cmd.reset(0);
        f.resources.bind(cmd.as_mut());
        let offset = f.resources.list_offset(f.instance_list);
        assert_eq!(
            f.headless.heap_slot(f.resources.descriptor_heap(), offset + 1),
            Some(cbv(42).into())
        );
    }

    #[test]
    fn test_table_views_survive_resize_and_write_through() {
        let mut f = fixture();
        let early = GfxShaderResourceView::AccelerationStructure { address: 0x5000 };
        f.resources.create_shader_resource_view(f.table_entry, 0, early);
        f.resources.update(&NoDescriptorLists).unwrap();

        let mut cmd = f.device.create_command_list(2, "cmd").unwrap();
        cmd.reset(0);
        f.resources.bind(cmd.as_mut());
        let heap = f.resources.descriptor_heap();
        assert_eq!(f.headless.heap_slot(heap, 0), Some(early.into()));

        // 绑定之后写入的视图直接出现在 GPU 堆中
        let late = GfxShaderResourceView::AccelerationStructure { address: 0x9000 };
        f.resources.create_shader_resource_view(f.table_entry, 1, late);
        assert_eq!(f.headless.heap_slot(heap, 1), Some(late.into()));
    }

    #[test]
    fn test_bind_sets_every_parameter_and_defers_selection() {
        let mut f = fixture();
        f.resources.set_selection_list_content(&f.selection, &[cbv(1), cbv(2)]);
        f.resources.set_constant(f.constant, 7);
        f.resources.update(&NoDescriptorLists).unwrap();

        let mut cmd = f.device.create_command_list(2, "cmd").unwrap();
        cmd.reset(0);
        f.headless.take_commands();
        f.resources.bind(cmd.as_mut());

        let heap = f.resources.descriptor_heap();
        let commands = f.headless.take_commands();
        assert!(commands.contains(&RecordedCommand::SetDescriptorHeap(heap)));
        assert!(commands.contains(&RecordedCommand::SetRootConstant {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            parameter: 0,
            value: 7,
        }));
        assert!(commands.contains(&RecordedCommand::SetRootView {
            bind_point: vk::PipelineBindPoint::COMPUTE,
            parameter: 0,
            kind: GfxRootViewKind::ConstantBuffer,
            address: 0xabc00,
        }));
        assert!(commands.contains(&RecordedCommand::SetRootDescriptorTable {
            bind_point: vk::PipelineBindPoint::COMPUTE,
            parameter: 2,
            handle: GfxGpuDescriptorHandle {
                heap,
                offset: f.resources.list_offset(f.instance_list),
            },
        }));
        // 选择列表此时还没有绑定
        assert!(!commands.iter().any(|command| matches!(
            command,
            RecordedCommand::SetRootDescriptorTable {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                ..
            }
        )));
        assert_eq!(
            f.resources.pending_binds(),
            &[PendingBind {
                list: f.selection.handle(),
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                parameter: 1,
                selection: None,
            }]
        );

        f.resources.bind_selection_list_index(&f.selection, 1);
        f.resources.resolve_pending_binds(cmd.as_mut());
        assert_eq!(
            f.headless.take_commands(),
            vec![RecordedCommand::SetRootDescriptorTable {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                parameter: 1,
                handle: GfxGpuDescriptorHandle {
                    heap,
                    offset: f.resources.list_offset(f.selection.handle()) + 1,
                },
            }]
        );
        assert_eq!(f.headless.heap_slot(heap, f.resources.list_offset(f.selection.handle()) + 1), Some(cbv(2).into()));
    }

    #[test]
    fn test_update_constant_records_immediately() {
        let mut f = fixture();
        let mut cmd = f.device.create_command_list(2, "cmd").unwrap();
        cmd.reset(1);
        f.headless.take_commands();

        f.resources.update_constant(cmd.as_mut(), f.constant, 3);
        assert_eq!(f.resources.constant(f.constant), 3);
        assert_eq!(
            f.headless.take_commands(),
            vec![RecordedCommand::SetRootConstant {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                parameter: 0,
                value: 3,
            }]
        );
    }

    #[test]
    #[should_panic(expected = "is not a descriptor table")]
    fn test_view_through_list_parameter_panics() {
        let mut f = fixture();
        let forged = TableEntry {
            parameter: f.instance_list.0,
            in_heap_index: 0,
        };
        f.resources.create_constant_buffer_view(forged, 0, cbv(0));
    }

    #[test]
    #[should_panic(expected = "outside table entry")]
    fn test_view_outside_table_entry_panics() {
        let mut f = fixture();
        f.resources
            .create_shader_resource_view(f.table_entry, 2, GfxShaderResourceView::AccelerationStructure { address: 0 });
    }

    #[test]
    #[should_panic(expected = "is not a descriptor list")]
    fn test_refresh_of_invalid_handle_panics() {
        let mut f = fixture();
        f.resources.request_list_refresh(ListHandle(0), &IntegerSet::<usize>::full(1));
    }

    #[test]
    #[should_panic(expected = "selection window 2..4")]
    fn test_selection_window_must_fit_in_content() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let mut pair = None;
        let mut resources = ShaderResources::new(
            &device,
            "pair",
            |graphics| {
                pair = Some(graphics.add_constant_buffer_view_descriptor_selection_list(GfxShaderLocation::new(1, 0), 2));
            },
            |_| {},
        )
        .unwrap();
        let pair = pair.unwrap();

        resources.set_selection_list_content(&pair, &[cbv(1), cbv(2), cbv(3)]);
        resources.update(&NoDescriptorLists).unwrap();
        let mut cmd = device.create_command_list(2, "cmd").unwrap();
        cmd.reset(0);
        resources.bind(cmd.as_mut());

        // 最后一个完整窗口从 1 开始
        resources.bind_selection_list_index(&pair, 1);
        assert_eq!(resources.pending_binds()[0].selection, Some(1));
        resources.bind_selection_list_index(&pair, 2);
    }

    #[test]
    #[should_panic(expected = "selection window")]
    fn test_selection_outside_content_panics() {
        let mut f = fixture();
        f.resources.set_selection_list_content(&f.selection, &[cbv(1), cbv(2)]);
        f.resources.update(&NoDescriptorLists).unwrap();
        let mut cmd = f.device.create_command_list(2, "cmd").unwrap();
        cmd.reset(0);
        f.resources.bind(cmd.as_mut());
        f.resources.bind_selection_list_index(&f.selection, 2);
    }
}
