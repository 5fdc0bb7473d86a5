use std::marker::PhantomData;

use crate::stable_index::StableIndex;

const WORD_BITS: usize = u64::BITS as usize;

/// 以稳定索引为键的位集合
///
/// 用于标记 [`crate::bag::Bag`] 中哪些成员发生了变化，不需要在元素上存放标志位。
pub struct IntegerSet<I: StableIndex = usize> {
    words: Vec<u64>,
    count: usize,

    _phantom: PhantomData<I>,
}
impl<I: StableIndex> Default for IntegerSet<I> {
    fn default() -> Self {
        Self {
            words: Vec::new(),
            count: 0,
            _phantom: PhantomData,
        }
    }
}
impl<I: StableIndex> Clone for IntegerSet<I> {
    fn clone(&self) -> Self {
        Self {
            words: self.words.clone(),
            count: self.count,
            _phantom: PhantomData,
        }
    }
}
// new & init
impl<I: StableIndex> IntegerSet<I> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含 `[0, count)` 全部索引的集合
    pub fn full(count: usize) -> Self {
        let full_words = count / WORD_BITS;
        let remainder = count % WORD_BITS;

        let mut words = vec![u64::MAX; full_words];
        if remainder > 0 {
            words.push((1u64 << remainder) - 1);
        }

        Self {
            words,
            count,
            _phantom: PhantomData,
        }
    }
}
// update
impl<I: StableIndex> IntegerSet<I> {
    /// 插入索引，返回之前是否不存在
    pub fn insert(&mut self, index: I) -> bool {
        let (word, bit) = Self::locate(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }

        let newly_inserted = self.words[word] & bit == 0;
        if newly_inserted {
            self.words[word] |= bit;
            self.count += 1;
        }
        newly_inserted
    }

    /// 移除索引，返回之前是否存在；越界索引直接忽略
    pub fn erase(&mut self, index: I) -> bool {
        let (word, bit) = Self::locate(index);
        let Some(slot) = self.words.get_mut(word) else {
            return false;
        };

        let present = *slot & bit != 0;
        if present {
            *slot &= !bit;
            self.count -= 1;
        }
        present
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.count = 0;
    }

    /// 并入另一个集合
    pub fn union_with(&mut self, other: &IntegerSet<I>) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= *src;
        }
        self.count = self.words.iter().map(|word| word.count_ones() as usize).sum();
    }
}
// getter
impl<I: StableIndex> IntegerSet<I> {
    #[inline]
    pub fn contains(&self, index: I) -> bool {
        let (word, bit) = Self::locate(index);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 升序遍历
    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(I::from_usize(word_index * WORD_BITS + bit))
            })
        })
    }

    /// 换一种索引类型解释同一组整数
    pub fn cast<J: StableIndex>(&self) -> IntegerSet<J> {
        IntegerSet {
            words: self.words.clone(),
            count: self.count,
            _phantom: PhantomData,
        }
    }
}
// tools
impl<I: StableIndex> IntegerSet<I> {
    #[inline]
    fn locate(index: I) -> (usize, u64) {
        let value = index.to_usize();
        (value / WORD_BITS, 1u64 << (value % WORD_BITS))
    }
}
impl<I: StableIndex> FromIterator<I> for IntegerSet<I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
impl<I: StableIndex> Extend<I> for IntegerSet<I> {
    fn extend<T: IntoIterator<Item = I>>(&mut self, iter: T) {
        for index in iter {
            self.insert(index);
        }
    }
}
impl<I: StableIndex> std::fmt::Debug for IntegerSet<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_erase_contains() {
        let mut set: IntegerSet = IntegerSet::new();
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.insert(130));
        assert_eq!(set.count(), 2);
        assert!(set.contains(3) && set.contains(130));

        assert!(set.erase(3));
        assert!(!set.contains(3));
        assert!(!set.erase(3));
        // 越界擦除不会出错
        assert!(!set.erase(100_000));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_full_contains_exactly_range() {
        for n in [0usize, 1, 63, 64, 65, 200] {
            let set: IntegerSet = IntegerSet::full(n);
            assert_eq!(set.count(), n);
            assert_eq!(set.iter().collect::<Vec<_>>(), (0..n).collect::<Vec<_>>());
            assert!(!set.contains(n));
        }
    }

    #[test]
    fn test_iteration_is_ascending() {
        let set: IntegerSet = [90usize, 5, 64, 0, 63].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 5, 63, 64, 90]);
    }

    #[test]
    fn test_union_and_clear() {
        let mut a: IntegerSet = [1usize, 2].into_iter().collect();
        let b: IntegerSet = [2usize, 300].into_iter().collect();
        a.union_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 300]);
        assert_eq!(a.count(), 3);

        a.clear();
        assert!(a.is_empty());
        assert!(!a.contains(300));
    }
}
