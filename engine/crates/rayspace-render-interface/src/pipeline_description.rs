//! 宿主提供的管线描述
//!
//! 全部类型都可以从 TOML 反序列化，字段缺省时使用 [`Default`] 中的值。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read pipeline description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse pipeline description: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid pipeline description: {0}")]
    Invalid(String),
}

/// 一个着色器文件
///
/// 有导出符号时作为光追着色器库编译，否则作为单独的计算着色器编译。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderFileDescription {
    pub path: PathBuf,
    pub symbols: Vec<String>,
}
impl ShaderFileDescription {
    #[inline]
    pub fn is_library(&self) -> bool {
        !self.symbols.is_empty()
    }
}

/// 材质对应的 hit group 符号与标志
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescription {
    pub name: String,
    pub visible: bool,
    pub shadow_caster: bool,
    pub opaque: bool,

    pub is_animated: bool,
    /// 在全部计算着色器中的序号
    pub animation_shader_index: u32,

    pub normal_closest_hit_symbol: String,
    pub normal_any_hit_symbol: Option<String>,
    pub normal_intersection_symbol: Option<String>,

    pub shadow_closest_hit_symbol: String,
    pub shadow_any_hit_symbol: Option<String>,
    pub shadow_intersection_symbol: Option<String>,
}
impl Default for MaterialDescription {
    fn default() -> Self {
        Self {
            name: String::new(),
            visible: true,
            shadow_caster: true,
            opaque: true,
            is_animated: false,
            animation_shader_index: 0,
            normal_closest_hit_symbol: String::new(),
            normal_any_hit_symbol: None,
            normal_intersection_symbol: None,
            shadow_closest_hit_symbol: String::new(),
            shadow_any_hit_symbol: None,
            shadow_intersection_symbol: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacePipelineDescription {
    pub shader_files: Vec<ShaderFileDescription>,
    pub materials: Vec<MaterialDescription>,

    pub anisotropy: u32,
    pub texture_count_first_slot: u32,
    pub texture_count_second_slot: u32,
    pub custom_data_buffer_size: u32,

    pub mesh_spool_count: u32,
    pub effect_spool_count: u32,
}
impl Default for SpacePipelineDescription {
    fn default() -> Self {
        Self {
            shader_files: Vec::new(),
            materials: Vec::new(),
            anisotropy: 16,
            texture_count_first_slot: 0,
            texture_count_second_slot: 0,
            custom_data_buffer_size: 0,
            mesh_spool_count: 0,
            effect_spool_count: 0,
        }
    }
}
// new & init
impl SpacePipelineDescription {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let description: Self = toml::from_str(text)?;
        description.validate()?;
        Ok(description)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let description = Self::from_toml_str(&text)?;
        log::info!(
            "pipeline description loaded from {}: {} shader files, {} materials",
            path.display(),
            description.shader_files.len(),
            description.materials.len()
        );
        Ok(description)
    }
}
// getter
impl SpacePipelineDescription {
    /// 计算着色器（没有导出符号的文件），按出现顺序
    pub fn compute_shaders(&self) -> impl Iterator<Item = &ShaderFileDescription> {
        self.shader_files.iter().filter(|file| !file.is_library())
    }

    pub fn libraries(&self) -> impl Iterator<Item = &ShaderFileDescription> {
        self.shader_files.iter().filter(|file| file.is_library())
    }
}
// tools
impl SpacePipelineDescription {
    fn validate(&self) -> Result<(), ConfigError> {
        let compute_count = self.compute_shaders().count() as u32;
        for material in &self.materials {
            if material.name.is_empty() {
                return Err(ConfigError::Invalid("material without a name".to_string()));
            }
            if material.is_animated && material.animation_shader_index >= compute_count {
                return Err(ConfigError::Invalid(format!(
                    "material '{}' uses animation shader {} but only {compute_count} compute shaders exist",
                    material.name, material.animation_shader_index
                )));
            }
            if material.normal_intersection_symbol.is_some() != material.shadow_intersection_symbol.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "material '{}' mixes procedural and triangle hit groups",
                    material.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        anisotropy = 8
        texture_count_first_slot = 2
        mesh_spool_count = 16

        [[shader_files]]
        path = "shaders/RayGen.hlsl"
        symbols = ["RayGen"]

        [[shader_files]]
        path = "shaders/Animation.hlsl"

        [[materials]]
        name = "Block"
        normal_closest_hit_symbol = "ClosestHit"
        shadow_closest_hit_symbol = "ShadowClosestHit"

        [[materials]]
        name = "Water"
        opaque = false
        is_animated = true
        animation_shader_index = 0
        normal_closest_hit_symbol = "WaterClosestHit"
        shadow_closest_hit_symbol = "WaterShadowClosestHit"
    "#;

    #[test]
    fn test_parse_sample() {
        let description = SpacePipelineDescription::from_toml_str(SAMPLE).unwrap();
        assert_eq!(description.anisotropy, 8);
        assert_eq!(description.texture_count_second_slot, 0);
        assert_eq!(description.libraries().count(), 1);
        assert_eq!(description.compute_shaders().count(), 1);

        let water = &description.materials[1];
        assert!(water.is_animated && !water.opaque && water.visible);
        assert_eq!(water.normal_intersection_symbol, None);
    }

    #[test]
    fn test_animation_index_must_exist() {
        let text = SAMPLE.replace("animation_shader_index = 0", "animation_shader_index = 3");
        let err = SpacePipelineDescription::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SpacePipelineDescription::load_from_file("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
