//! Index-stable slot pools for short-lived pending state.
//!
//! Pending audition state churns quickly (many stimuli per second, each
//! fanning out into several rays). The pools hand out plain `usize` indices
//! which stay valid until the slot is released, so records can refer to each
//! other without borrowing.

use std::ops::{Index, IndexMut};

/// Number of releases between two sorts of the index lists.
pub const DEFAULT_SORT_INTERVAL: u32 = 32;

/// Free-list backed slot allocator.
///
/// Every index ever handed out is either in the allocated list or in the free
/// list, never both. The backing vector only grows, so a live slot is never
/// moved to another index.
///
/// Every `sort_interval` releases the free list is sorted descending (low
/// indices are popped first) and the allocated list ascending, which keeps live
/// slots clustered at the front and iteration sequential.
#[derive(Debug, Clone)]
pub struct ItemPool<T> {
    items: Vec<T>,
    allocated: Vec<usize>,
    free: Vec<usize>,
    sort_interval: u32,
    releases_until_sort: u32,
}

impl<T: Default> ItemPool<T> {
    /// Create an empty pool with the default sort interval.
    pub fn new() -> Self {
        Self::with_sort_interval(DEFAULT_SORT_INTERVAL)
    }

    /// Create an empty pool sorting its index lists every `sort_interval` releases.
    pub fn with_sort_interval(sort_interval: u32) -> Self {
        let sort_interval = sort_interval.max(1);
        Self {
            items: Vec::new(),
            allocated: Vec::new(),
            free: Vec::new(),
            sort_interval,
            releases_until_sort: sort_interval,
        }
    }

    /// Hands out a slot holding `T::default()`, reusing a freed index when
    /// one is available.
    pub fn allocate(&mut self) -> usize {
        let index = match self.free.pop() {
            Some(index) => {
                self.items[index] = T::default();
                index
            }
            None => {
                self.items.push(T::default());
                self.items.len() - 1
            }
        };
        self.allocated.push(index);
        index
    }

    /// Returns `index` to the free list.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not currently allocated (double release or a
    /// corrupt index).
    pub fn release(&mut self, index: usize) {
        let Some(position) = self.allocated.iter().position(|&i| i == index) else {
            panic!("ItemPool: releasing index {index} which is not allocated");
        };
        self.allocated.swap_remove(position);
        self.free.push(index);

        self.releases_until_sort -= 1;
        if self.releases_until_sort == 0 {
            self.free.sort_unstable_by(|a, b| b.cmp(a));
            self.allocated.sort_unstable();
            self.releases_until_sort = self.sort_interval;
        }
    }

    /// Removes every slot. All previously handed out indices become invalid.
    pub fn clear(&mut self) {
        self.items.clear();
        self.allocated.clear();
        self.free.clear();
        self.releases_until_sort = self.sort_interval;
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    /// Check whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    /// Check whether `index` is a live slot.
    pub fn is_allocated(&self, index: usize) -> bool {
        self.allocated.contains(&index)
    }

    /// Indices of the live slots, in the pool's current iteration order.
    pub fn allocated_indices(&self) -> &[usize] {
        &self.allocated
    }

    /// Get a live slot, or `None` if `index` is not allocated.
    pub fn get(&self, index: usize) -> Option<&T> {
        if self.is_allocated(index) {
            self.items.get(index)
        } else {
            None
        }
    }

    /// Get a live slot mutably, or `None` if `index` is not allocated.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.is_allocated(index) {
            self.items.get_mut(index)
        } else {
            None
        }
    }

    /// Iterates over `(index, item)` for every live slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.allocated.iter().map(|&i| (i, &self.items[i]))
    }

    #[cfg(test)]
    fn free_indices(&self) -> &[usize] {
        &self.free
    }
}

impl<T: Default> Default for ItemPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for ItemPool<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.items.len(),
            "ItemPool: index {index} out of bounds ({})",
            self.items.len()
        );
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for ItemPool<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.items.len(),
            "ItemPool: index {index} out of bounds ({})",
            self.items.len()
        );
        &mut self.items[index]
    }
}

#[derive(Debug, Clone, Default)]
struct Counted<T> {
    ref_count: u32,
    item: T,
}

/// [`ItemPool`] with a manual reference count per slot.
///
/// Slots start with a count of zero. [`RefCountedItemPool::dec_ref`] releases
/// the slot when the count drops back to zero.
#[derive(Debug, Clone)]
pub struct RefCountedItemPool<T> {
    pool: ItemPool<Counted<T>>,
}

impl<T: Default> RefCountedItemPool<T> {
    /// Create an empty pool with the default sort interval.
    pub fn new() -> Self {
        Self::with_sort_interval(DEFAULT_SORT_INTERVAL)
    }

    /// Create an empty pool sorting its index lists every `sort_interval` releases.
    pub fn with_sort_interval(sort_interval: u32) -> Self {
        Self {
            pool: ItemPool::with_sort_interval(sort_interval),
        }
    }

    /// Hand out a slot with a reference count of zero.
    pub fn allocate(&mut self) -> usize {
        self.pool.allocate()
    }

    /// Add one reference to a live slot.
    pub fn add_ref(&mut self, index: usize) {
        self.pool[index].ref_count += 1;
    }

    /// Drops one reference. When the last reference goes, the slot is
    /// released and its item is handed back to the caller.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub fn dec_ref(&mut self, index: usize) -> Option<T> {
        let slot = &mut self.pool[index];
        assert!(
            slot.ref_count > 0,
            "RefCountedItemPool: dec_ref on index {index} with zero references"
        );
        slot.ref_count -= 1;
        if slot.ref_count > 0 {
            return None;
        }
        let item = std::mem::take(&mut slot.item);
        self.release(index);
        Some(item)
    }

    /// Get the current reference count of a slot.
    pub fn ref_count(&self, index: usize) -> u32 {
        self.pool[index].ref_count
    }

    /// Releases a slot directly.
    ///
    /// # Panics
    ///
    /// Panics if the slot still has references, or is not allocated.
    pub fn release(&mut self, index: usize) {
        assert_eq!(
            self.pool[index].ref_count, 0,
            "RefCountedItemPool: releasing index {index} which is still referenced"
        );
        self.pool.release(index);
    }

    /// Remove every slot, whatever its reference count.
    pub fn clear(&mut self) {
        self.pool.clear();
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Check whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Check whether `index` is a live slot.
    pub fn is_allocated(&self, index: usize) -> bool {
        self.pool.is_allocated(index)
    }

    /// Get the item of a live slot.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.pool.get(index).map(|slot| &slot.item)
    }

    /// Get the item of a live slot mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.pool.get_mut(index).map(|slot| &mut slot.item)
    }
}

impl<T: Default> Default for RefCountedItemPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for RefCountedItemPool<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.pool[index].item
    }
}

impl<T> IndexMut<usize> for RefCountedItemPool<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.pool[index].item
    }
}
