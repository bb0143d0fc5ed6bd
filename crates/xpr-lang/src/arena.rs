use serde::{Deserialize, Serialize};
use std::{
    marker::PhantomData,
    ops::{Index, IndexMut},
};

/// A type-safe identifier for elements stored in an [`Arena`].
///
/// Uses phantom data so that an `ArenaId<A>` cannot be used to access
/// elements of an `Arena<B>`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ArenaId<T> {
    id: u32,
    #[serde(skip)]
    _phantom_data: PhantomData<fn() -> T>,
}

impl<T> Copy for ArenaId<T> {}

impl<T> Clone for ArenaId<T> {
    #[inline(always)]
    fn clone(&self) -> ArenaId<T> {
        *self
    }
}

impl<T> From<u32> for ArenaId<T> {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl<T> From<usize> for ArenaId<T> {
    fn from(id: usize) -> Self {
        Self::new(id as u32)
    }
}

impl<T> ArenaId<T> {
    /// Creates a new arena identifier from a raw `u32` index.
    pub const fn new(id: u32) -> ArenaId<T> {
        Self {
            id,
            _phantom_data: PhantomData,
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.id as usize
    }
}

/// A sequential allocator for expression nodes.
///
/// Nodes reference each other through [`ArenaId`]s, which keeps the flat
/// statement chain and the folded tree in one contiguous store and makes the
/// whole structure trivially serializable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Arena<T> {
    /// Creates a new arena with the specified initial capacity.
    pub fn new(size: usize) -> Self {
        Arena {
            items: Vec::with_capacity(size),
        }
    }

    /// Allocates a value in the arena and returns its identifier.
    pub fn alloc(&mut self, value: T) -> ArenaId<T> {
        let arena_id = self.items.len() as u32;
        self.items.push(value);
        ArenaId::new(arena_id)
    }

    /// Returns the number of elements in the arena.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the arena contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the element at the given `ArenaId`, or `None` if out of bounds.
    pub fn get(&self, id: ArenaId<T>) -> Option<&T> {
        self.items.get(id.index())
    }

    pub fn get_mut(&mut self, id: ArenaId<T>) -> Option<&mut T> {
        self.items.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArenaId<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (ArenaId::new(i as u32), item))
    }
}

impl<T> Index<ArenaId<T>> for Arena<T> {
    type Output = T;

    fn index(&self, index: ArenaId<T>) -> &Self::Output {
        &self.items[index.index()]
    }
}

impl<T> IndexMut<ArenaId<T>> for Arena<T> {
    fn index_mut(&mut self, index: ArenaId<T>) -> &mut Self::Output {
        &mut self.items[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![1, 2, 3], 1, 2)]
    #[case(vec![1, 2, 3], 0, 1)]
    #[case(vec![1, 2, 3], 2, 3)]
    fn test_index(#[case] values: Vec<i32>, #[case] index: u32, #[case] expected: i32) {
        let mut arena = Arena::new(values.len());
        for v in values {
            arena.alloc(v);
        }
        assert_eq!(arena[ArenaId::new(index)], expected);
    }

    #[rstest]
    #[case(vec![1, 2, 3], 3, None)]
    #[case(vec![1, 2, 3], 1, Some(2))]
    #[case(Vec::new(), 0, None)]
    fn test_get(#[case] values: Vec<i32>, #[case] index: u32, #[case] expected: Option<i32>) {
        let mut arena = Arena::new(values.len());
        for v in values {
            arena.alloc(v);
        }
        assert_eq!(arena.get(ArenaId::new(index)).copied(), expected);
    }

    #[rstest]
    #[case(vec![1, 2, 3], 3)]
    #[case(Vec::new(), 0)]
    fn test_len(#[case] values: Vec<i32>, #[case] expected: usize) {
        let mut arena = Arena::new(values.len());
        for v in values {
            arena.alloc(v);
        }
        assert_eq!(arena.len(), expected);
        assert_eq!(arena.is_empty(), expected == 0);
    }

    #[test]
    fn test_index_mut() {
        let mut arena = Arena::new(2);
        let id = arena.alloc(String::from("a"));
        arena[id].push('b');
        assert_eq!(arena[id], "ab");
    }

    #[test]
    fn test_from() {
        let id_u32: ArenaId<i32> = 5u32.into();
        assert_eq!(id_u32.index(), 5);

        let id_usize: ArenaId<i32> = 10usize.into();
        assert_eq!(id_usize.index(), 10);
    }
}
