use ash::vk;

/// GPU 调用失败
///
/// 保留底层的 `vk::Result`，并附上失败时正在做的事情。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{context} failed: {code:?}")]
pub struct GfxError {
    pub code: vk::Result,
    pub context: String,
}
impl GfxError {
    #[inline]
    pub fn new(code: vk::Result, context: impl Into<String>) -> Self {
        Self {
            code,
            context: context.into(),
        }
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 给 `vk::Result` 补充上下文
pub trait VkResultExt<T> {
    fn context(self, context: &str) -> GfxResult<T>;
}
impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn context(self, context: &str) -> GfxResult<T> {
        self.map_err(|code| GfxError::new(code, context))
    }
}
