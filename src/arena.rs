//! Fixed-capacity slot arena addressed by generation-checked indices.
//!
//! Bodies and constraints live in an [`Arena`]. Removing an element bumps the
//! slot generation, so a stale handle held by a manifold or a joint simply
//! stops resolving instead of aliasing whatever is stored there next.

/// Raw slot address: position in the arena plus the generation it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl Index {
    /// Builds an index from its parts. Mostly useful for tests and tooling.
    pub const fn from_raw_parts(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with at most `N` live elements.
#[derive(Debug, Clone)]
pub struct Arena<T, const N: usize> {
    slots: heapless::Vec<Slot<T>, N>,
    len: usize,
}

impl<T, const N: usize> Default for Arena<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Arena<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: heapless::Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value, reusing the first vacant slot. Returns `None` when full.
    pub fn insert(&mut self, value: T) -> Option<Index> {
        if let Some((i, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.value.is_none())
        {
            slot.value = Some(value);
            self.len += 1;
            return Some(Index::from_raw_parts(i as u32, slot.generation));
        }

        let slot = self.slots.len() as u32;
        self.slots
            .push(Slot {
                generation: 0,
                value: Some(value),
            })
            .ok()?;
        self.len += 1;
        Some(Index::from_raw_parts(slot, 0))
    }

    /// Removes the value addressed by `index`. Stale or vacant indices yield `None`.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let slot = self.slots.get_mut(index.slot())?;
        if slot.generation != index.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, index: Index) -> Option<&T> {
        let slot = self.slots.get(index.slot())?;
        if slot.generation != index.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        let slot = self.slots.get_mut(index.slot())?;
        if slot.generation != index.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    /// Mutable access to two distinct live elements at once.
    ///
    /// Returns `None` if either index is stale or both address the same slot.
    pub fn pair_mut(&mut self, a: Index, b: Index) -> Option<(&mut T, &mut T)> {
        if a.slot == b.slot {
            return None;
        }
        let swapped = a.slot > b.slot;
        let (lo, hi) = if swapped { (b, a) } else { (a, b) };

        let (left, right) = self.slots.split_at_mut(hi.slot());
        let first = left.get_mut(lo.slot())?;
        let second = right.first_mut()?;
        if first.generation != lo.generation || second.generation != hi.generation {
            return None;
        }
        let first = first.value.as_mut()?;
        let second = second.value.as_mut()?;

        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// Live element stored in slot `slot`, with the index that currently addresses it.
    pub fn get_by_slot(&self, slot: usize) -> Option<(Index, &T)> {
        let s = self.slots.get(slot)?;
        s.value
            .as_ref()
            .map(|v| (Index::from_raw_parts(slot as u32, s.generation), v))
    }

    /// Number of slots ever allocated (live or vacant).
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (Index::from_raw_parts(i as u32, s.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(|v| (Index::from_raw_parts(i as u32, generation), v))
        })
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|s| s.value.as_mut())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::<u32, 4>::new();
        let a = arena.insert(10).unwrap();
        let b = arena.insert(20).unwrap();
        assert_eq!(arena.get(a), Some(&10));
        assert_eq!(arena.get(b), Some(&20));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_insert_at_capacity() {
        let mut arena = Arena::<u32, 2>::new();
        assert!(arena.insert(1).is_some());
        assert!(arena.insert(2).is_some());
        assert!(arena.insert(3).is_none());
    }

    #[test]
    fn test_stale_index_after_remove() {
        let mut arena = Arena::<u32, 4>::new();
        let a = arena.insert(1).unwrap();
        assert_eq!(arena.remove(a), Some(1));
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());

        // The slot is reused with a new generation; the old index stays dead.
        let b = arena.insert(2).unwrap();
        assert_eq!(a.slot(), b.slot());
        assert_ne!(a.generation(), b.generation());
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn test_pair_mut_order_and_aliasing() {
        let mut arena = Arena::<u32, 4>::new();
        let a = arena.insert(1).unwrap();
        let b = arena.insert(2).unwrap();

        let (x, y) = arena.pair_mut(b, a).unwrap();
        assert_eq!((*x, *y), (2, 1));
        *x += 10;
        assert_eq!(arena.get(b), Some(&12));

        assert!(arena.pair_mut(a, a).is_none());
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut arena = Arena::<u32, 4>::new();
        let a = arena.insert(1).unwrap();
        arena.insert(2).unwrap();
        arena.remove(a);
        let values: std::vec::Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, std::vec![2]);
        assert_eq!(arena.slot_count(), 2);
    }
}
