use ash::vk;

/// 着色器中的寄存器位置：`register(b2, space0)`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GfxShaderLocation {
    pub register: u32,
    pub space: u32,
}
impl GfxShaderLocation {
    #[inline]
    pub const fn new(register: u32, space: u32) -> Self {
        Self { register, space }
    }

    /// 同一寄存器，偏移到另一个 space
    #[inline]
    pub const fn offset_space(self, offset: u32) -> Self {
        Self {
            register: self.register,
            space: self.space + offset,
        }
    }
}
impl std::fmt::Display for GfxShaderLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(r{}, space{})", self.register, self.space)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GfxDescriptorRangeType {
    Cbv,
    Srv,
    Uav,
    Sampler,
}

/// 描述符表中的一段
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxDescriptorRange {
    pub range_type: GfxDescriptorRangeType,
    pub location: GfxShaderLocation,
    /// [`Self::UNBOUNDED`] 表示不定长
    pub count: u32,
    pub offset_in_table: u32,
}
impl GfxDescriptorRange {
    pub const UNBOUNDED: u32 = u32::MAX;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxRootParameter {
    Constants { location: GfxShaderLocation, count: u32 },
    ConstantBufferView { location: GfxShaderLocation },
    ShaderResourceView { location: GfxShaderLocation },
    UnorderedAccessView { location: GfxShaderLocation },
    DescriptorTable { ranges: Vec<GfxDescriptorRange> },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxStaticSamplerDesc {
    pub location: GfxShaderLocation,
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub max_anisotropy: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxRootSignatureDesc {
    pub parameters: Vec<GfxRootParameter>,
    pub static_samplers: Vec<GfxStaticSamplerDesc>,
    /// 光栅管线需要输入装配
    pub allow_input_assembler: bool,
    /// 光追管线的局部根签名
    pub local: bool,
    pub name: String,
}
