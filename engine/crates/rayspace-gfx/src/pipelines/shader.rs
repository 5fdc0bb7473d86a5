use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GfxShaderStage {
    /// 光追库，导出若干符号
    Library,
    Compute,
    Vertex,
    Pixel,
}

/// 编译后的着色器
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxShaderBlob {
    pub name: String,
    pub stage: GfxShaderStage,
    /// 光追库导出的符号；其他阶段只有入口函数
    pub exports: Vec<String>,
    pub code: Vec<u8>,
}
impl GfxShaderBlob {
    #[inline]
    pub fn exports_symbol(&self, symbol: &str) -> bool {
        self.exports.iter().any(|export| export == symbol)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to compile shader '{}': {message}", path.display())]
pub struct ShaderCompileError {
    pub path: PathBuf,
    pub message: String,
}

/// 着色器编译器
///
/// 源码编译由宿主提供，这里只约定输入与输出。
pub trait ShaderCompiler {
    /// 编译光追库，`symbols` 为需要导出的符号
    fn compile_library(&self, path: &Path, symbols: &[String]) -> Result<GfxShaderBlob, ShaderCompileError>;

    /// 编译入口为 `Main` 的计算着色器
    fn compile_compute(&self, path: &Path) -> Result<GfxShaderBlob, ShaderCompileError>;
}
