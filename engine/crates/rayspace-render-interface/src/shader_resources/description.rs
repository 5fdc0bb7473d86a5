use std::marker::PhantomData;

use ash::vk;
use rayspace_gfx::descriptors::root_signature::{
    GfxDescriptorRange, GfxDescriptorRangeType, GfxRootParameter, GfxRootSignatureDesc, GfxShaderLocation,
    GfxStaticSamplerDesc,
};
use rayspace_gfx::resources::views::{
    GfxConstantBufferView, GfxShaderResourceView, GfxUnorderedAccessView, GfxViewDescriptor,
};

/// 可以放进描述符堆的视图类型
pub trait DescriptorKind: Clone + Into<GfxViewDescriptor> {
    const RANGE_TYPE: GfxDescriptorRangeType;
}
impl DescriptorKind for GfxConstantBufferView {
    const RANGE_TYPE: GfxDescriptorRangeType = GfxDescriptorRangeType::Cbv;
}
impl DescriptorKind for GfxShaderResourceView {
    const RANGE_TYPE: GfxDescriptorRangeType = GfxDescriptorRangeType::Srv;
}
impl DescriptorKind for GfxUnorderedAccessView {
    const RANGE_TYPE: GfxDescriptorRangeType = GfxDescriptorRangeType::Uav;
}

/// 根常量
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstantHandle(pub(crate) u32);

/// 静态描述符表，值为根参数的全局序号
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableHandle(pub(crate) u32);

/// 描述符列表，值为根参数的全局序号
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListHandle(pub(crate) u32);

/// 描述符表中的一项，用于之后写入视图
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableEntry {
    pub(crate) parameter: u32,
    pub(crate) in_heap_index: u32,
}

/// 选择列表：每次绘制只绑定其中一个窗口
pub struct SelectionList<D: DescriptorKind> {
    pub(crate) handle: ListHandle,
    pub(crate) window: u32,

    _phantom: PhantomData<D>,
}
impl<D: DescriptorKind> SelectionList<D> {
    #[inline]
    pub fn handle(&self) -> ListHandle {
        self.handle
    }

    #[inline]
    pub fn window(&self) -> u32 {
        self.window
    }
}
impl<D: DescriptorKind> std::fmt::Debug for SelectionList<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionList")
            .field("handle", &self.handle)
            .field("window", &self.window)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RootParameter {
    Constant { index: u32 },
    ConstantBufferView { address: vk::DeviceAddress },
    ShaderResourceView { address: vk::DeviceAddress },
    UnorderedAccessView { address: vk::DeviceAddress },
    DescriptorTable { table: u32 },
    DescriptorList { list: u32 },
}

pub(crate) struct TableLayout {
    /// 每一项在表内的起始位置，最后一个元素为表的大小
    pub offsets: Vec<u32>,
    pub range_types: Vec<GfxDescriptorRangeType>,
}

pub(crate) struct ListDescription {
    pub range_type: GfxDescriptorRangeType,
    pub selection_window: Option<u32>,
}

/// 描述符表的构建器，只在 [`Description::add_heap_descriptor_table`] 中使用
pub struct Table {
    parameter: u32,
    ranges: Vec<GfxDescriptorRange>,
    /// 每一项在表内的起始位置，最后一个元素为表的大小
    offsets: Vec<u32>,
}
impl Table {
    fn new(parameter: u32) -> Self {
        Self {
            parameter,
            ranges: Vec::new(),
            offsets: vec![0],
        }
    }

    pub fn add_constant_buffer_view(&mut self, location: GfxShaderLocation, count: u32) -> TableEntry {
        self.add_view(location, count, GfxDescriptorRangeType::Cbv)
    }

    pub fn add_shader_resource_view(&mut self, location: GfxShaderLocation, count: u32) -> TableEntry {
        self.add_view(location, count, GfxDescriptorRangeType::Srv)
    }

    pub fn add_unordered_access_view(&mut self, location: GfxShaderLocation, count: u32) -> TableEntry {
        self.add_view(location, count, GfxDescriptorRangeType::Uav)
    }

    fn add_view(&mut self, location: GfxShaderLocation, count: u32, range_type: GfxDescriptorRangeType) -> TableEntry {
        assert!(
            count > 0 && count != GfxDescriptorRange::UNBOUNDED,
            "table entries need a fixed size, got {count} at {location}"
        );

        let offset = self.offsets.last().copied().unwrap_or(0);
        let in_heap_index = self.ranges.len() as u32;
        self.ranges.push(GfxDescriptorRange {
            range_type,
            location,
            count,
            offset_in_table: offset,
        });
        self.offsets.push(offset + count);

        TableEntry {
            parameter: self.parameter,
            in_heap_index,
        }
    }
}

/// 一个根签名的描述
///
/// 按调用顺序记录根参数；图形与计算两份描述共用一套全局的参数序号与常量序号。
pub struct Description {
    existing_parameter_count: u32,
    existing_constant_count: u32,

    pub(crate) parameters: Vec<RootParameter>,
    pub(crate) root_signature: GfxRootSignatureDesc,
    pub(crate) constant_count: u32,
    pub(crate) tables: Vec<TableLayout>,
    pub(crate) lists: Vec<ListDescription>,
}
// new & init
impl Description {
    pub(crate) fn new(existing_parameter_count: u32, existing_constant_count: u32, name: &str) -> Self {
        Self {
            existing_parameter_count,
            existing_constant_count,
            parameters: Vec::new(),
            root_signature: GfxRootSignatureDesc {
                name: name.to_string(),
                ..Default::default()
            },
            constant_count: 0,
            tables: Vec::new(),
            lists: Vec::new(),
        }
    }
}
// update
impl Description {
    /// 在根签名中直接放置一个 32 位常量
    pub fn add_root_constant(&mut self, location: GfxShaderLocation) -> ConstantHandle {
        let handle = ConstantHandle(self.existing_constant_count + self.constant_count);
        self.push_parameter(
            RootParameter::Constant {
                index: handle.0,
            },
            GfxRootParameter::Constants { location, count: 1 },
        );
        self.constant_count += 1;
        handle
    }

    pub fn add_constant_buffer_view(&mut self, address: vk::DeviceAddress, location: GfxShaderLocation) {
        self.push_parameter(
            RootParameter::ConstantBufferView { address },
            GfxRootParameter::ConstantBufferView { location },
        );
    }

    pub fn add_shader_resource_view(&mut self, address: vk::DeviceAddress, location: GfxShaderLocation) {
        self.push_parameter(
            RootParameter::ShaderResourceView { address },
            GfxRootParameter::ShaderResourceView { location },
        );
    }

    pub fn add_unordered_access_view(&mut self, address: vk::DeviceAddress, location: GfxShaderLocation) {
        self.push_parameter(
            RootParameter::UnorderedAccessView { address },
            GfxRootParameter::UnorderedAccessView { location },
        );
    }

    /// 固定大小的描述符表，内容通过 [`TableEntry`] 写入
    pub fn add_heap_descriptor_table(&mut self, builder: impl FnOnce(&mut Table)) -> TableHandle {
        let parameter = self.next_parameter();
        let mut table = Table::new(parameter);
        builder(&mut table);

        let table_index = self.tables.len() as u32;
        let range_types = table.ranges.iter().map(|range| range.range_type).collect();
        self.push_parameter(
            RootParameter::DescriptorTable { table: table_index },
            GfxRootParameter::DescriptorTable { ranges: table.ranges },
        );
        self.tables.push(TableLayout {
            offsets: table.offsets,
            range_types,
        });
        TableHandle(parameter)
    }

    pub fn add_static_sampler(&mut self, location: GfxShaderLocation, filter: vk::Filter) {
        self.root_signature.static_samplers.push(GfxStaticSamplerDesc {
            location,
            filter,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 16,
        });
    }

    pub fn enable_input_assembler(&mut self) {
        self.root_signature.allow_input_assembler = true;
    }

    /// 不定长的 CBV 列表，内容来自 [`super::DescriptorListSource`]
    pub fn add_constant_buffer_view_descriptor_list(&mut self, location: GfxShaderLocation) -> ListHandle {
        self.add_descriptor_list::<GfxConstantBufferView>(location, None)
    }

    pub fn add_shader_resource_view_descriptor_list(&mut self, location: GfxShaderLocation) -> ListHandle {
        self.add_descriptor_list::<GfxShaderResourceView>(location, None)
    }

    pub fn add_unordered_access_view_descriptor_list(&mut self, location: GfxShaderLocation) -> ListHandle {
        self.add_descriptor_list::<GfxUnorderedAccessView>(location, None)
    }

    pub fn add_constant_buffer_view_descriptor_selection_list(
        &mut self,
        location: GfxShaderLocation,
        window: u32,
    ) -> SelectionList<GfxConstantBufferView> {
        self.add_selection_list(location, window)
    }

    pub fn add_shader_resource_view_descriptor_selection_list(
        &mut self,
        location: GfxShaderLocation,
        window: u32,
    ) -> SelectionList<GfxShaderResourceView> {
        self.add_selection_list(location, window)
    }

    pub fn add_unordered_access_view_descriptor_selection_list(
        &mut self,
        location: GfxShaderLocation,
        window: u32,
    ) -> SelectionList<GfxUnorderedAccessView> {
        self.add_selection_list(location, window)
    }
}
// tools
impl Description {
    fn add_selection_list<D: DescriptorKind>(&mut self, location: GfxShaderLocation, window: u32) -> SelectionList<D> {
        assert!(window > 0, "selection window must not be empty");
        SelectionList {
            handle: self.add_descriptor_list::<D>(location, Some(window)),
            window,
            _phantom: PhantomData,
        }
    }

    fn add_descriptor_list<D: DescriptorKind>(
        &mut self,
        location: GfxShaderLocation,
        selection_window: Option<u32>,
    ) -> ListHandle {
        let handle = ListHandle(self.next_parameter());
        let list_index = self.lists.len() as u32;
        self.push_parameter(
            RootParameter::DescriptorList { list: list_index },
            GfxRootParameter::DescriptorTable {
                ranges: vec![GfxDescriptorRange {
                    range_type: D::RANGE_TYPE,
                    location,
                    count: selection_window.unwrap_or(GfxDescriptorRange::UNBOUNDED),
                    offset_in_table: 0,
                }],
            },
        );
        self.lists.push(ListDescription {
            range_type: D::RANGE_TYPE,
            selection_window,
        });
        handle
    }

    #[inline]
    fn next_parameter(&self) -> u32 {
        self.existing_parameter_count + self.parameters.len() as u32
    }

    fn push_parameter(&mut self, parameter: RootParameter, desc: GfxRootParameter) {
        self.parameters.push(parameter);
        self.root_signature.parameters.push(desc);
    }
}
