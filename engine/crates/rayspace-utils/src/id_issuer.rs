use std::cell::Cell;

/// 由 [`IdIssuer`] 发放的对象 ID，主要用于 GPU 资源的调试名
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);
impl ObjectId {
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}
impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 对象 ID 分配器
///
/// 由顶层客户端持有并注入到需要 ID 的对象中，同一个分配器发出的 ID 单调递增、互不重复。
#[derive(Debug, Default)]
pub struct IdIssuer {
    next: Cell<u64>,
}
impl IdIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从指定值开始发放，便于测试中得到确定的 ID
    pub fn starting_at(first: u64) -> Self {
        Self { next: Cell::new(first) }
    }

    pub fn issue(&self) -> ObjectId {
        let id = self.next.get();
        self.next.set(id + 1);
        ObjectId(id)
    }

    /// 已经发放的 ID 数量上界，即下一次将要发放的值
    #[inline]
    pub fn peek_next(&self) -> u64 {
        self.next.get()
    }
}
