use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use crate::{GfxError, GfxResult};

/// Opaque index into a [`HandlePool`]. Pure lookup key, no ownership
/// semantics of its own: valid from the `allocate` that produced it to the
/// matching `deallocate`.
pub struct ResourceHandle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceHandle<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceHandle<T> {}

impl<T> PartialEq for ResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for ResourceHandle<T> {}

impl<T> std::fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResourceHandle").field(&self.index).finish()
    }
}

enum Slot<T> {
    Occupied(T),
    Free { next: Option<u32> },
}

/// Fixed-capacity slot allocator with an intrusive free list. Capacity is
/// set at construction and never grows: handles must stay valid for the
/// engine's lifetime and the backends pre-size their pools to known
/// maxima. Allocation and deallocation are O(1) and allocate no memory
/// after construction.
///
/// Not internally synchronized; owners wrap the pool in a mutex when it is
/// shared across recording threads.
pub struct HandlePool<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    first_free: Option<u32>,
    len: usize,
}

impl<T> HandlePool<T> {
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        assert!(capacity > 0);
        assert!(capacity <= u32::MAX as usize);
        let slots = (0..capacity)
            .map(|i| {
                let next = if i + 1 < capacity {
                    Some(i as u32 + 1)
                } else {
                    None
                };
                Slot::Free { next }
            })
            .collect();

        Self {
            kind,
            slots,
            first_free: Some(0),
            len: 0,
        }
    }

    /// Constructs `payload` in a free slot and returns its handle. Fails
    /// with `PoolExhausted` once `capacity` allocations are live.
    pub fn allocate(&mut self, payload: T) -> GfxResult<ResourceHandle<T>> {
        let index = self.first_free.ok_or(GfxError::PoolExhausted {
            kind: self.kind,
            capacity: self.slots.len(),
        })?;

        match self.slots[index as usize] {
            Slot::Free { next } => {
                self.first_free = next;
                self.slots[index as usize] = Slot::Occupied(payload);
                self.len += 1;
                Ok(ResourceHandle::new(index))
            }
            Slot::Occupied(_) => unreachable!("free list points at a live slot"),
        }
    }

    /// Removes the payload and pushes the slot on the free list.
    ///
    /// Deallocating an already-free or out-of-range handle is a caller
    /// contract violation and panics.
    pub fn deallocate(&mut self, handle: ResourceHandle<T>) -> T {
        let index = handle.index as usize;
        let slot = std::mem::replace(
            &mut self.slots[index],
            Slot::Free {
                next: self.first_free,
            },
        );
        match slot {
            Slot::Occupied(payload) => {
                self.first_free = Some(handle.index);
                self.len -= 1;
                payload
            }
            Slot::Free { next } => {
                // Restore before dying so a caught panic leaves the pool
                // consistent.
                self.slots[index] = Slot::Free { next };
                panic!("double free of {} handle {}", self.kind, handle.index);
            }
        }
    }

    pub fn get(&self, handle: ResourceHandle<T>) -> Option<&T> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Occupied(payload)) => Some(payload),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: ResourceHandle<T>) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot::Occupied(payload)) => Some(payload),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.first_free.is_none()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Drops every live payload and rebuilds the free list. Device
    /// tear-down only.
    pub(crate) fn clear(&mut self) {
        let capacity = self.slots.len();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let next = if i + 1 < capacity {
                Some(i as u32 + 1)
            } else {
                None
            };
            *slot = Slot::Free { next };
        }
        self.first_free = Some(0);
        self.len = 0;
    }
}

impl<T> Index<ResourceHandle<T>> for HandlePool<T> {
    type Output = T;

    fn index(&self, handle: ResourceHandle<T>) -> &T {
        match &self.slots[handle.index as usize] {
            Slot::Occupied(payload) => payload,
            Slot::Free { .. } => panic!("stale {} handle {}", self.kind, handle.index),
        }
    }
}

impl<T> IndexMut<ResourceHandle<T>> for HandlePool<T> {
    fn index_mut(&mut self, handle: ResourceHandle<T>) -> &mut T {
        match &mut self.slots[handle.index as usize] {
            Slot::Occupied(payload) => payload,
            Slot::Free { .. } => panic!("stale {} handle {}", self.kind, handle.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_distinct_live_handles() {
        let mut pool = HandlePool::new("test", 8);
        let mut handles = Vec::new();
        for i in 0..8 {
            let h = pool.allocate(i).unwrap();
            assert!(!handles.contains(&h));
            handles.push(h);
        }
        assert_eq!(pool.len(), 8);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(pool[*h], i);
        }
    }

    #[test]
    fn exhaustion_reports_pool_exhausted_and_pool_stays_usable() {
        let mut pool = HandlePool::new("test", 8);
        let handles: Vec<_> = (0..8).map(|i| pool.allocate(i).unwrap()).collect();

        for i in 8..10 {
            assert_eq!(
                pool.allocate(i),
                Err(GfxError::PoolExhausted {
                    kind: "test",
                    capacity: 8
                })
            );
        }

        // Still internally consistent: dealloc/realloc keeps working.
        assert_eq!(pool.deallocate(handles[3]), 3);
        assert_eq!(pool.len(), 7);
        let h = pool.allocate(42).unwrap();
        assert_eq!(pool[h], 42);
        assert!(pool.is_full());
    }

    #[test]
    fn free_slots_are_reused_lifo() {
        let mut pool = HandlePool::new("test", 4);
        let a = pool.allocate("a").unwrap();
        let _b = pool.allocate("b").unwrap();
        pool.deallocate(a);
        let c = pool.allocate("c").unwrap();
        assert_eq!(c.index(), a.index());
        assert_eq!(pool[c], "c");
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut pool = HandlePool::new("test", 2);
        let h = pool.allocate(1).unwrap();
        pool.deallocate(h);
        pool.deallocate(h);
    }

    #[test]
    #[should_panic(expected = "stale")]
    fn indexing_a_freed_handle_panics() {
        let mut pool = HandlePool::new("test", 2);
        let h = pool.allocate(1).unwrap();
        pool.deallocate(h);
        let _ = pool[h];
    }

    #[test]
    fn len_plus_free_list_equals_capacity() {
        let mut pool = HandlePool::<u32>::new("test", 16);
        let mut live = Vec::new();
        for i in 0..16 {
            live.push(pool.allocate(i).unwrap());
        }
        for h in live.drain(8..) {
            pool.deallocate(h);
        }
        assert_eq!(pool.len(), 8);
        assert_eq!(pool.capacity(), 16);
        // Eight more allocations must succeed, the ninth must not.
        for i in 0..8 {
            pool.allocate(i).unwrap();
        }
        assert!(pool.allocate(99).is_err());
    }
}
