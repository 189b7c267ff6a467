use static_assertions::const_assert_eq;
use std::{
    fmt, mem,
    num::NonZeroU32,
    ops::Index,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

/// An opaque number that uniquely identifies the value stored in a given [`BumpAllocator32`].
///
/// An `Option<AllocId32>` still only requires 32 bits.
pub type AllocId32 = NonZeroU32;

const_assert_eq!(
    mem::size_of::<Option<AllocId32>>(),
    mem::size_of::<AllocId32>()
);

/// The allocator had no room left for the requested values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Exhausted;

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("allocator capacity exhausted")
    }
}

impl std::error::Error for Exhausted {}

/// A fixed-capacity arena of up to `u32::MAX - 1` values of type `T`. Indexed by 32-bit [`AllocId32`].
///
/// Values are handed out by bumping a cursor and are never freed individually. [`reset`](Self::reset) rewinds the cursor
/// to the end of the reserved prefix in O(1), which invalidates every id issued since the previous reset.
///
/// Allocation only requires `&self`, so any number of threads can allocate from the same arena at once. The slots are
/// not cleared on reset; callers reinitialize whatever they allocate, so `T` typically uses interior mutability.
pub struct BumpAllocator32<T> {
    values: Box<[T]>,
    reserved: u32,
    cursor: AtomicU32,
    exhausted: AtomicBool,
}

impl<T: Default> BumpAllocator32<T> {
    pub fn new(capacity: u32) -> Self {
        assert!(capacity <= Self::MAX_CAPACITY);

        Self {
            values: (0..capacity).map(|_| T::default()).collect(),
            reserved: 0,
            cursor: AtomicU32::new(0),
            exhausted: AtomicBool::new(false),
        }
    }
}

impl<T> BumpAllocator32<T> {
    const MAX_CAPACITY: u32 = u32::MAX - 1;

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.values.len() as u32
    }

    /// Number of slots in use, including the reserved prefix.
    #[inline]
    pub fn len(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == self.reserved
    }

    #[inline]
    pub fn num_reserved(&self) -> u32 {
        self.reserved
    }

    /// True if any allocation failed since the last reset.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// Permanently claims the next `count` slots. Reserved slots survive [`reset`](Self::reset).
    ///
    /// Returns the id of the first reserved slot; the rest follow consecutively.
    pub fn reserve(&mut self, count: u32) -> Result<AllocId32, Exhausted> {
        let first = self.bump(count)?;
        self.reserved = *self.cursor.get_mut();
        Ok(first)
    }

    #[inline]
    pub fn allocate(&self) -> Result<AllocId32, Exhausted> {
        self.bump(1)
    }

    /// Allocates two consecutive slots, or neither of them.
    #[inline]
    pub fn allocate_pair(&self) -> Result<[AllocId32; 2], Exhausted> {
        let first = self.bump(2)?;
        Ok([first, Self::index_to_id(Self::id_to_index(first) + 1)])
    }

    /// Forgets every value allocated since the last reset, keeping the reserved prefix.
    pub fn reset(&mut self) {
        *self.cursor.get_mut() = self.reserved;
        *self.exhausted.get_mut() = false;
    }

    #[inline]
    pub fn get(&self, id: AllocId32) -> Option<&T> {
        let index = Self::id_to_index(id);
        (index < self.len() as usize)
            .then(|| self.values.get(index))
            .flatten()
    }

    #[inline]
    pub fn get_mut(&mut self, id: AllocId32) -> Option<&mut T> {
        let index = Self::id_to_index(id);
        if index < *self.cursor.get_mut() as usize {
            self.values.get_mut(index)
        } else {
            None
        }
    }

    /// The ids of all live values, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = AllocId32> {
        (0..self.len() as usize).map(Self::index_to_id)
    }

    fn bump(&self, count: u32) -> Result<AllocId32, Exhausted> {
        let capacity = self.capacity();
        // The cursor never moves past capacity, so a failed request leaves room for a smaller one.
        let start = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor.checked_add(count).filter(|&end| end <= capacity)
            })
            .map_err(|_| {
                self.exhausted.store(true, Ordering::Release);
                Exhausted
            })?;
        Ok(Self::index_to_id(start as usize))
    }

    #[inline]
    pub const fn id_to_index(id: AllocId32) -> usize {
        (id.get() - 1) as usize
    }

    #[inline]
    pub fn index_to_id(index: usize) -> AllocId32 {
        assert!(index < Self::MAX_CAPACITY as usize);
        // Can't be zero after the increment.
        match AllocId32::new(index as u32 + 1) {
            Some(id) => id,
            None => unreachable!(),
        }
    }
}

impl<T> Index<AllocId32> for BumpAllocator32<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: AllocId32) -> &Self::Output {
        self.values.index(Self::id_to_index(id))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocate_until_exhausted() {
        let arena = BumpAllocator32::<u32>::new(3);
        let a = arena.allocate().unwrap();
        let [b, c] = arena.allocate_pair().unwrap();
        assert_eq!(BumpAllocator32::<u32>::id_to_index(a), 0);
        assert_eq!(c.get(), b.get() + 1);
        assert!(!arena.is_exhausted());

        assert_eq!(arena.allocate(), Err(Exhausted));
        assert!(arena.is_exhausted());
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn failed_pair_leaves_room_for_single() {
        let arena = BumpAllocator32::<u32>::new(3);
        arena.allocate_pair().unwrap();
        assert_eq!(arena.allocate_pair(), Err(Exhausted));
        assert!(arena.allocate().is_ok());
    }

    #[test]
    fn reset_reuses_slots_after_reserved_prefix() {
        let mut arena = BumpAllocator32::<u32>::new(8);
        let first_reserved = arena.reserve(2).unwrap();
        assert_eq!(first_reserved.get(), 1);

        let first = arena.allocate().unwrap();
        arena.allocate_pair().unwrap();
        assert_eq!(arena.len(), 5);

        arena.reset();
        assert!(arena.is_empty());
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.allocate().unwrap(), first);
        assert!(arena.get(first_reserved).is_some());
    }

    #[test]
    fn stale_ids_are_not_readable() {
        let mut arena = BumpAllocator32::<u32>::new(4);
        let id = arena.allocate().unwrap();
        assert!(arena.get(id).is_some());
        arena.reset();
        assert!(arena.get(id).is_none());
        assert!(arena.get_mut(id).is_none());
    }

    #[test]
    fn concurrent_allocation_hands_out_unique_ids() {
        let arena = BumpAllocator32::<u32>::new(1000);

        let mut all_ids: Vec<u32> = crossbeam::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|_| {
                        let mut ids = Vec::new();
                        while let Ok([a, b]) = arena.allocate_pair() {
                            ids.push(a.get());
                            ids.push(b.get());
                        }
                        ids
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        })
        .unwrap();

        assert_eq!(all_ids.len(), 1000);
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), 1000);
        assert!(arena.is_exhausted());
    }
}
