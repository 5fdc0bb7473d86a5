/// 可以作为 [`crate::bag::Bag`] 与 [`crate::integer_set::IntegerSet`] 键的索引类型
pub trait StableIndex: Copy + Eq + Ord + std::hash::Hash + std::fmt::Debug {
    fn from_usize(value: usize) -> Self;
    fn to_usize(self) -> usize;
}

impl StableIndex for usize {
    #[inline]
    fn from_usize(value: usize) -> Self {
        value
    }

    #[inline]
    fn to_usize(self) -> usize {
        self
    }
}

/// 声明一个强类型的稳定索引
///
/// ```ignore
/// new_stable_index! {
///     /// 激活集合中的索引
///     pub struct ActiveIndex;
/// }
/// ```
#[macro_export]
macro_rules! new_stable_index {
    ($($(#[$meta:meta])* $vis:vis struct $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
            $vis struct $name(pub usize);

            impl $crate::stable_index::StableIndex for $name {
                #[inline]
                fn from_usize(value: usize) -> Self {
                    Self(value)
                }

                #[inline]
                fn to_usize(self) -> usize {
                    self.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}#{}", stringify!($name), self.0)
                }
            }
        )+
    };
}
