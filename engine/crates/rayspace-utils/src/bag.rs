use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

use crate::stable_index::StableIndex;

/// 稳定索引的对象池
///
/// - `push` 优先复用最小的空位，否则追加到末尾
/// - `pop` 把槽位变成空位，其余元素的索引保持不变
/// - 遍历按索引升序，跳过空位
///
/// 空位使用最小堆维护，`push`/`pop` 都是 O(log n)。
pub struct Bag<T, I: StableIndex = usize> {
    elements: Vec<Option<T>>,
    gaps: BinaryHeap<Reverse<usize>>,
    count: usize,

    _phantom: PhantomData<I>,
}
impl<T, I: StableIndex> Default for Bag<T, I> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            gaps: BinaryHeap::new(),
            count: 0,
            _phantom: PhantomData,
        }
    }
}
// new & init
impl<T, I: StableIndex> Bag<T, I> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}
// update
impl<T, I: StableIndex> Bag<T, I> {
    /// 放入一个元素，返回其索引
    pub fn push(&mut self, element: T) -> I {
        let index = match self.gaps.pop() {
            Some(Reverse(gap)) => {
                debug_assert!(self.elements[gap].is_none());
                self.elements[gap] = Some(element);
                gap
            }
            None => {
                self.elements.push(Some(element));
                self.elements.len() - 1
            }
        };

        self.count += 1;
        I::from_usize(index)
    }

    /// 取出指定索引处的元素，槽位留作空位
    ///
    /// 槽位必须被占用。
    pub fn pop(&mut self, index: I) -> T {
        let slot = index.to_usize();
        assert!(slot < self.elements.len(), "bag index {index:?} out of range");

        let Some(element) = self.elements[slot].take() else {
            panic!("bag slot {index:?} is not occupied");
        };

        self.gaps.push(Reverse(slot));
        self.count -= 1;
        element
    }
}
// getter
impl<T, I: StableIndex> Bag<T, I> {
    /// 当前存活的元素数量
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// 槽位总数（含空位），即可能出现的最大索引加一
    #[inline]
    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn contains(&self, index: I) -> bool {
        self.elements.get(index.to_usize()).is_some_and(Option::is_some)
    }

    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.elements.get(index.to_usize()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.elements.get_mut(index.to_usize()).and_then(Option::as_mut)
    }

    /// 按索引升序遍历存活元素
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(slot, element)| element.as_ref().map(|element| (I::from_usize(slot), element)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> + '_ {
        self.elements
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, element)| element.as_mut().map(|element| (I::from_usize(slot), element)))
    }

    pub fn indices(&self) -> impl Iterator<Item = I> + '_ {
        self.iter().map(|(index, _)| index)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.elements.iter().filter_map(Option::as_ref)
    }
}
impl<T, I: StableIndex> std::ops::Index<I> for Bag<T, I> {
    type Output = T;

    fn index(&self, index: I) -> &Self::Output {
        match self.get(index) {
            Some(element) => element,
            None => panic!("bag slot {index:?} is not occupied"),
        }
    }
}
impl<T, I: StableIndex> std::ops::IndexMut<I> for Bag<T, I> {
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(element) => element,
            None => panic!("bag slot {index:?} is not occupied"),
        }
    }
}
impl<T: std::fmt::Debug, I: StableIndex> std::fmt::Debug for Bag<T, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_push_reuses_smallest_gap() {
        let mut bag: Bag<&str> = Bag::new();
        let a = bag.push("a");
        let b = bag.push("b");
        let c = bag.push("c");
        let d = bag.push("d");
        assert_eq!((a, b, c, d), (0, 1, 2, 3));

        // 先弹出 2 再弹出 0，下一次 push 应该拿到 0
        assert_eq!(bag.pop(c), "c");
        assert_eq!(bag.pop(a), "a");
        assert_eq!(bag.push("e"), 0);
        assert_eq!(bag.push("f"), 2);
        assert_eq!(bag.push("g"), 4);

        assert_eq!(bag.count(), 5);
        assert_eq!(bag.capacity(), 5);
    }

    #[test]
    fn test_iteration_is_ordered_and_skips_gaps() {
        let mut bag: Bag<u32> = Bag::new();
        for value in 0..6 {
            bag.push(value * 10);
        }
        bag.pop(1);
        bag.pop(4);

        let visited: Vec<_> = bag.iter().map(|(index, value)| (index, *value)).collect();
        assert_eq!(visited, vec![(0, 0), (2, 20), (3, 30), (5, 50)]);
        assert!(!bag.contains(4));
        assert!(bag.get(4).is_none());
    }

    #[test]
    fn test_count_tracks_random_push_pop_sequence() {
        let mut bag: Bag<u64> = Bag::new();
        let mut shadow: BTreeMap<usize, u64> = BTreeMap::new();

        // 简单的线性同余序列，保证测试可复现
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            state >> 33
        };

        for step in 0..2000 {
            let roll = next();
            if roll % 3 != 0 || shadow.is_empty() {
                let index = bag.push(step);
                assert!(shadow.insert(index, step).is_none(), "index {index} handed out twice");
            } else {
                let victim = *shadow.keys().nth((roll as usize) % shadow.len()).unwrap();
                assert_eq!(bag.pop(victim), shadow.remove(&victim).unwrap());
            }

            assert_eq!(bag.count(), shadow.len());
        }

        let live: Vec<_> = bag.iter().map(|(index, value)| (index, *value)).collect();
        let expected: Vec<_> = shadow.into_iter().collect();
        assert_eq!(live, expected);
    }

    #[test]
    #[should_panic]
    fn test_pop_empty_slot_panics() {
        let mut bag: Bag<u32> = Bag::new();
        let index = bag.push(7);
        bag.pop(index);
        bag.pop(index);
    }
}
