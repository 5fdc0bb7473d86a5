use std::rc::Rc;

use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::pipelines::pipeline_desc::GfxHitGroupDesc;
use rayspace_gfx::raytracing::sbt::GfxSbtEntry;
use rayspace_render_interface::pipeline_description::MaterialDescription;

use crate::gpu_data::MaterialBuffer;
use crate::shader_buffer::ShaderBuffer;

bitflags::bitflags! {
    /// 同时用作 TLAS 实例的可见性掩码
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u8 {
        const VISIBLE = 1 << 0;
        const SHADOW_CASTER = 1 << 1;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GeometryType {
    /// quad 顶点加共享索引
    Triangles,
    /// 包围盒加相交着色器
    Procedural,
}

/// mesh 需要的材质信息
///
/// 材质创建后不可变，mesh 持有这份拷贝而不是引用。
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaterialInfo {
    pub index: u32,
    pub hit_group_index: u32,
    pub geometry_type: GeometryType,
    pub opaque: bool,
    pub flags: MaterialFlags,
    /// 所属动画控制器
    pub animation: Option<usize>,
}
impl MaterialInfo {
    #[inline]
    pub fn is_animated(&self) -> bool {
        self.animation.is_some()
    }
}

/// 一对 hit group（普通光线与阴影光线）
pub struct Material {
    name: String,
    info: MaterialInfo,

    normal_hit_group: GfxHitGroupDesc,
    shadow_hit_group: GfxHitGroupDesc,

    /// 作为 hit group 的局部根参数
    constant_buffer: ShaderBuffer,
}
// new & init
impl Material {
    /// `animation` 为该材质对应的动画控制器序号
    pub fn new(
        device: &Rc<dyn GfxDevice>,
        description: &MaterialDescription,
        index: u32,
        animation: Option<usize>,
    ) -> GfxResult<Self> {
        assert_eq!(
            description.normal_intersection_symbol.is_some(),
            description.shadow_intersection_symbol.is_some(),
            "material '{}' mixes procedural and triangle hit groups",
            description.name
        );

        let mut flags = MaterialFlags::empty();
        flags.set(MaterialFlags::VISIBLE, description.visible);
        flags.set(MaterialFlags::SHADOW_CASTER, description.shadow_caster);

        let geometry_type = if description.normal_intersection_symbol.is_some() {
            GeometryType::Procedural
        } else {
            GeometryType::Triangles
        };

        let hit_group = |prefix: &str, closest: &str, any: &Option<String>, intersection: &Option<String>| {
            GfxHitGroupDesc {
                name: format!("{prefix}_{}", description.name),
                closest_hit: closest.to_string(),
                any_hit: any.clone(),
                intersection: intersection.clone(),
            }
        };

        let constant_buffer =
            ShaderBuffer::with_data(device, &MaterialBuffer { index }, format!("material '{}'", description.name))?;

        Ok(Self {
            name: description.name.clone(),
            info: MaterialInfo {
                index,
                hit_group_index: index * 2,
                geometry_type,
                opaque: description.opaque,
                flags,
                animation,
            },
            normal_hit_group: hit_group(
                "N",
                &description.normal_closest_hit_symbol,
                &description.normal_any_hit_symbol,
                &description.normal_intersection_symbol,
            ),
            shadow_hit_group: hit_group(
                "S",
                &description.shadow_closest_hit_symbol,
                &description.shadow_any_hit_symbol,
                &description.shadow_intersection_symbol,
            ),
            constant_buffer,
        })
    }
}
// getter
impl Material {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn info(&self) -> MaterialInfo {
        self.info
    }

    /// 普通与阴影两个 hit group
    pub fn hit_groups(&self) -> [&GfxHitGroupDesc; 2] {
        [&self.normal_hit_group, &self.shadow_hit_group]
    }

    /// SBT 中的两条记录，顺序与 `hit_group_index` 对应
    pub fn sbt_entries(&self) -> [GfxSbtEntry; 2] {
        let address = self.constant_buffer.address();
        [
            GfxSbtEntry::new(&self.normal_hit_group.name).argument(address),
            GfxSbtEntry::new(&self.shadow_hit_group.name).argument(address),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayspace_gfx::headless::HeadlessDevice;

    fn device() -> Rc<dyn GfxDevice> {
        Rc::new(HeadlessDevice::new())
    }

    #[test]
    fn test_hit_groups_and_flags() {
        let description = MaterialDescription {
            name: "Foliage".to_string(),
            shadow_caster: false,
            opaque: false,
            normal_closest_hit_symbol: "FoliageClosestHit".to_string(),
            shadow_closest_hit_symbol: "FoliageShadowClosestHit".to_string(),
            ..Default::default()
        };
        let material = Material::new(&device(), &description, 3, None).unwrap();

        let info = material.info();
        assert_eq!(info.hit_group_index, 6);
        assert_eq!(info.flags, MaterialFlags::VISIBLE);
        assert_eq!(info.geometry_type, GeometryType::Triangles);
        assert!(!info.opaque && !info.is_animated());

        let [normal, shadow] = material.hit_groups();
        assert_eq!(normal.name, "N_Foliage");
        assert_eq!(shadow.name, "S_Foliage");
        assert_eq!(material.sbt_entries()[1].local_root_arguments.len(), 1);
    }

    #[test]
    fn test_intersection_symbol_makes_material_procedural() {
        let description = MaterialDescription {
            name: "Fluid".to_string(),
            normal_intersection_symbol: Some("FluidIntersection".to_string()),
            shadow_intersection_symbol: Some("FluidIntersection".to_string()),
            ..Default::default()
        };
        let material = Material::new(&device(), &description, 0, Some(1)).unwrap();
        assert_eq!(material.info().geometry_type, GeometryType::Procedural);
        assert_eq!(material.info().animation, Some(1));
    }

    #[test]
    #[should_panic(expected = "mixes procedural")]
    fn test_mismatched_intersection_panics() {
        let description = MaterialDescription {
            name: "Broken".to_string(),
            normal_intersection_symbol: Some("Intersection".to_string()),
            ..Default::default()
        };
        let _ = Material::new(&device(), &description, 0, None);
    }
}
