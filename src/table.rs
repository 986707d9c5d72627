//! Generational slot tables.
//!
//! Everything in a sketch is addressed through a [`Handle`]: an (index,
//! generation) pair into a [`Table`]. Removing a slot bumps its generation,
//! so every handle issued before the removal goes stale and can be detected
//! in O(1) without a lookup table.

use std::fmt;
use std::marker::PhantomData;

/// Slot indices are 16-bit, so one table holds at most this many slots.
/// The index `0xFFFF` is reserved for [`Handle::NULL`].
pub const MAX_SLOTS: usize = u16::MAX as usize;

/// How many slots to add when the free list runs dry.
fn growth_step(cap: usize) -> usize {
    (cap / 2).max(64).min(MAX_SLOTS - cap)
}

/// A stable reference to a slot in a [`Table`].
///
/// Handles are cheap to copy and compare equal iff both index and generation
/// match. A handle outlives the slot it names: after the slot is removed, the
/// handle is merely *stale* and every table operation on it reports "not
/// found".
pub struct Handle<T> {
    idx: u16,
    generation: u32,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The reserved null handle. Never names a live slot: live slots start
    /// at generation 1.
    pub const NULL: Self = Self {
        idx: u16::MAX,
        generation: 0,
        _payload: PhantomData,
    };

    pub(crate) fn new(idx: u16, generation: u32) -> Self {
        Self {
            idx,
            generation,
            _payload: PhantomData,
        }
    }

    /// Whether this is the reserved null handle.
    pub fn is_null(&self) -> bool {
        self.idx == u16::MAX
    }

    /// The slot index this handle names.
    pub fn index(&self) -> u16 {
        self.idx
    }

    /// The generation this handle was issued at.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls: the derives would demand `T: Clone` etc., but a handle is
// plain data regardless of its payload type.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.idx.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(null)")
        } else {
            write!(f, "Handle({}v{})", self.idx, self.generation)
        }
    }
}

enum Slot<T> {
    Live {
        generation: u32,
        value: T,
    },
    /// The free list is an intrusive stack threaded through dead slots.
    Free {
        generation: u32,
        next_free: Option<u16>,
    },
}

/// A container with O(1) insert, remove and lookup, and stable identity
/// across both.
///
/// Capacity grows geometrically and never shrinks; removed slots are pushed
/// on a free list and reused by later inserts, under a bumped generation so
/// old handles cannot alias the new occupant.
pub struct Table<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u16>,
    live: usize,
}

impl<T> Table<T> {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            live: 0,
        }
    }

    /// An empty table with memory reserved for `cap` slots.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            slots: Vec::with_capacity(cap.min(MAX_SLOTS)),
            free_head: None,
            live: 0,
        }
    }

    /// Append a batch of chained free slots.
    fn grow(&mut self) {
        let cap = self.slots.len();
        if cap >= MAX_SLOTS {
            return;
        }
        let add = growth_step(cap);
        for i in 0..add {
            let next_free = if i + 1 < add {
                Some((cap + i + 1) as u16)
            } else {
                self.free_head
            };
            // New slots start at generation 1, so generation 0 is unambiguously null.
            self.slots.push(Slot::Free {
                generation: 1,
                next_free,
            });
        }
        self.free_head = Some(cap as u16);
    }

    /// Store `value` in a fresh slot and return its handle.
    ///
    /// Returns `None` once all [`MAX_SLOTS`] slots are live.
    pub fn insert(&mut self, value: T) -> Option<Handle<T>> {
        if self.free_head.is_none() {
            self.grow();
        }
        let idx = self.free_head?;
        let slot = &mut self.slots[idx as usize];
        let generation = match slot {
            Slot::Free {
                generation,
                next_free,
            } => {
                self.free_head = *next_free;
                *generation
            }
            Slot::Live { .. } => unreachable!("free list points at a live slot"),
        };
        *slot = Slot::Live { generation, value };
        self.live += 1;
        Some(Handle::new(idx, generation))
    }

    /// Remove the slot `h` names. Returns false if `h` is stale or null.
    ///
    /// The generation counter is bumped, so `h` (and every copy of it) is
    /// stale from here on. A slot whose counter would wrap is leaked rather
    /// than recycled into a colliding handle.
    pub fn remove(&mut self, h: Handle<T>) -> bool {
        let Some(slot) = self.slots.get_mut(h.idx as usize) else {
            return false;
        };
        match slot {
            Slot::Live { generation, .. } if *generation == h.generation => {
                match generation.checked_add(1) {
                    Some(bumped) => {
                        *slot = Slot::Free {
                            generation: bumped,
                            next_free: self.free_head,
                        };
                        self.free_head = Some(h.idx);
                    }
                    None => {
                        *slot = Slot::Free {
                            generation: u32::MAX,
                            next_free: None,
                        };
                    }
                }
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Whether `h` names a live slot.
    pub fn contains(&self, h: Handle<T>) -> bool {
        matches!(
            self.slots.get(h.idx as usize),
            Some(Slot::Live { generation, .. }) if *generation == h.generation
        )
    }

    /// Borrow the value `h` names, if it is still live.
    pub fn get(&self, h: Handle<T>) -> Option<&T> {
        match self.slots.get(h.idx as usize)? {
            Slot::Live { generation, value } if *generation == h.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow the value `h` names, if it is still live.
    pub fn get_mut(&mut self, h: Handle<T>) -> Option<&mut T> {
        match self.slots.get_mut(h.idx as usize)? {
            Slot::Live { generation, value } if *generation == h.generation => Some(value),
            _ => None,
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no slots are live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total slots ever allocated (live + free). Never shrinks.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over live slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Live { generation, value } => Some((Handle::new(i as u16, *generation), value)),
            Slot::Free { .. } => None,
        })
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut t = Table::new();
        let h = t.insert("a").unwrap();
        assert!(t.contains(h));
        assert_eq!(t.get(h), Some(&"a"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn fresh_slots_start_at_generation_one() {
        let mut t = Table::new();
        let h = t.insert(0u8).unwrap();
        assert_eq!(h.generation(), 1);
        assert!(!h.is_null());
    }

    #[test]
    fn remove_makes_handle_stale() {
        let mut t = Table::new();
        let h = t.insert(5i32).unwrap();
        assert!(t.remove(h));
        assert!(!t.contains(h));
        assert!(t.get(h).is_none());
        assert!(t.get_mut(h).is_none());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut t = Table::new();
        let h = t.insert(5i32).unwrap();
        assert!(t.remove(h));
        // Second removal sees a stale handle and is a no-op.
        assert!(!t.remove(h));
    }

    #[test]
    fn reuse_bumps_generation() {
        let mut t = Table::new();
        let h1 = t.insert("x").unwrap();
        t.remove(h1);
        let h2 = t.insert("y").unwrap();
        // Slot is reused under a strictly greater generation.
        assert_eq!(h2.index(), h1.index());
        assert!(h2.generation() > h1.generation());
        assert_ne!(h1, h2);
        assert!(!t.contains(h1));
        assert_eq!(t.get(h2), Some(&"y"));
    }

    #[test]
    fn capacity_never_shrinks() {
        let mut t = Table::new();
        let handles: Vec<_> = (0..10).map(|i| t.insert(i).unwrap()).collect();
        let cap = t.capacity();
        for h in handles {
            t.remove(h);
        }
        assert_eq!(t.capacity(), cap);
        assert!(t.is_empty());
        // Reinserting reuses the freed slots instead of growing.
        for i in 0..10 {
            t.insert(i).unwrap();
        }
        assert_eq!(t.capacity(), cap);
    }

    #[test]
    fn null_handle_is_never_live() {
        let mut t: Table<u8> = Table::new();
        assert!(Handle::<u8>::NULL.is_null());
        assert!(!t.contains(Handle::NULL));
        assert!(!t.remove(Handle::NULL));
        t.insert(1).unwrap();
        assert!(!t.contains(Handle::NULL));
    }

    #[test]
    fn iteration_follows_slot_order() {
        let mut t = Table::new();
        let a = t.insert("a").unwrap();
        let b = t.insert("b").unwrap();
        let c = t.insert("c").unwrap();
        t.remove(b);
        let live: Vec<_> = t.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(live, vec![(a, "a"), (c, "c")]);
    }

    #[test]
    fn get_mut_writes_through() {
        let mut t = Table::new();
        let h = t.insert(1.0f64).unwrap();
        *t.get_mut(h).unwrap() = 2.5;
        assert_eq!(t.get(h), Some(&2.5));
    }

    #[test]
    fn table_fills_to_the_cap_then_refuses() {
        let mut t = Table::new();
        for i in 0..MAX_SLOTS {
            assert!(t.insert(i as u16).is_some(), "slot {i} should allocate");
        }
        assert_eq!(t.len(), MAX_SLOTS);
        // The 2^16 - 1 slots are all live: the next insert must fail cleanly.
        assert!(t.insert(0).is_none());
        // Freeing one slot makes insertion possible again.
        let h = t.iter().next().map(|(h, _)| h).unwrap();
        assert!(t.remove(h));
        assert!(t.insert(7).is_some());
    }

    #[test]
    fn handles_compare_on_index_and_generation() {
        let mut t = Table::new();
        let h = t.insert(()).unwrap();
        let copy = h;
        assert_eq!(h, copy);
        t.remove(h);
        let h2 = t.insert(()).unwrap();
        assert_eq!(h2.index(), h.index());
        assert_ne!(h, h2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(u32),
            RemoveLive(usize),
            RemoveStale(usize),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u32..1000).prop_map(Op::Insert),
                (0usize..64).prop_map(Op::RemoveLive),
                (0usize..64).prop_map(Op::RemoveStale),
            ]
        }

        proptest! {
            #[test]
            fn live_handles_stay_live_and_stale_stay_stale(
                ops in proptest::collection::vec(op_strategy(), 1..100),
            ) {
                let mut t = Table::new();
                let mut live: Vec<(Handle<u32>, u32)> = Vec::new();
                let mut stale: Vec<Handle<u32>> = Vec::new();
                for op in ops {
                    match op {
                        Op::Insert(v) => {
                            let h = t.insert(v).unwrap();
                            live.push((h, v));
                        }
                        Op::RemoveLive(i) if !live.is_empty() => {
                            let (h, _) = live.remove(i % live.len());
                            prop_assert!(t.remove(h));
                            stale.push(h);
                        }
                        Op::RemoveStale(i) if !stale.is_empty() => {
                            let h = stale[i % stale.len()];
                            prop_assert!(!t.remove(h));
                        }
                        _ => {}
                    }
                    // Every live handle resolves to the value it was created with.
                    for &(h, v) in &live {
                        prop_assert_eq!(t.get(h), Some(&v));
                    }
                    // Every removed handle stays dead.
                    for &h in &stale {
                        prop_assert!(!t.contains(h));
                    }
                    prop_assert_eq!(t.len(), live.len());
                }
            }

            #[test]
            fn generations_strictly_increase_per_slot(
                rounds in 1usize..50,
            ) {
                let mut t = Table::new();
                let mut last_gen = 0u32;
                for i in 0..rounds {
                    let h = t.insert(i).unwrap();
                    prop_assert_eq!(h.index(), 0, "single-slot churn must reuse slot 0");
                    prop_assert!(h.generation() > last_gen);
                    last_gen = h.generation();
                    t.remove(h);
                }
            }
        }
    }
}
