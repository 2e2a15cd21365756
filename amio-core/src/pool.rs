//! Stable-id object registry.
//!
//! Ported from `original_source/amio/pool.c`: a fixed-capacity slot array plus a monotonic
//! `next_id` cursor. An id, once issued, is never reused — even after its object is removed —
//! and a slot is identified only by `allocated && stored_id == id`, so a stale id can never
//! alias a newer object that happens to land in the same slot.

use std::fmt;

#[derive(Debug)]
struct Slot<T> {
    id: u32,
    allocated: bool,
    object: Option<T>,
    /// Free-list links, valid only while `!allocated`.
    prev_free: Option<usize>,
    next_free: Option<usize>,
}

/// A fixed-capacity registry mapping monotonically increasing ids to owned objects.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    next_id: u32,
    free_head: Option<usize>,
    free_tail: Option<usize>,
    len: usize,
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.slots.len())
            .field("len", &self.len)
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot {
                id: 0,
                allocated: false,
                object: None,
                prev_free: i.checked_sub(1),
                next_free: if i + 1 < capacity { Some(i + 1) } else { None },
            });
        }
        Self {
            slots,
            next_id: 1,
            free_head: Some(0),
            free_tail: Some(capacity - 1),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn unlink_free(&mut self, index: usize) {
        let (prev, next) = (self.slots[index].prev_free, self.slots[index].next_free);
        match prev {
            Some(p) => self.slots[p].next_free = next,
            None => self.free_head = next,
        }
        match next {
            Some(n) => self.slots[n].prev_free = prev,
            None => self.free_tail = prev,
        }
        self.slots[index].prev_free = None;
        self.slots[index].next_free = None;
    }

    fn push_free_tail(&mut self, index: usize) {
        self.slots[index].prev_free = self.free_tail;
        self.slots[index].next_free = None;
        match self.free_tail {
            Some(t) => self.slots[t].next_free = Some(index),
            None => self.free_head = Some(index),
        }
        self.free_tail = Some(index);
    }

    /// Inserts `object`, returning its newly issued id, or `None` if the pool is saturated.
    ///
    /// Tries the slot designated by `next_id % capacity` first (the cheap common case where
    /// no collision has ever happened there); if that slot is occupied, advances `next_id` to
    /// the next multiple of `capacity` plus the first free slot's index, which is guaranteed
    /// free, and uses that instead. This keeps `id % capacity` always equal to the slot the
    /// object actually lands in, and keeps `next_id` strictly monotonic.
    pub fn put(&mut self, object: T) -> Option<u32> {
        let capacity = self.slots.len() as u32;
        let preferred = (self.next_id % capacity) as usize;
        if self.slots[preferred].allocated {
            let first_free = self.free_head? as u32;
            self.next_id = (self.next_id / capacity + 1) * capacity + first_free;
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let index = (id % capacity) as usize;
        self.unlink_free(index);
        let slot = &mut self.slots[index];
        slot.id = id;
        slot.allocated = true;
        slot.object = Some(object);
        self.len += 1;
        Some(id)
    }

    fn slot_index_for(&self, id: u32) -> usize {
        (id % self.slots.len() as u32) as usize
    }

    fn matching_slot(&self, id: u32) -> Option<usize> {
        let index = self.slot_index_for(id);
        let slot = &self.slots[index];
        (slot.allocated && slot.id == id).then_some(index)
    }

    pub fn find(&self, id: u32) -> Option<&T> {
        let index = self.matching_slot(id)?;
        self.slots[index].object.as_ref()
    }

    pub fn find_mut(&mut self, id: u32) -> Option<&mut T> {
        let index = self.matching_slot(id)?;
        self.slots[index].object.as_mut()
    }

    /// Removes and returns the object stored under `id`, if any. The id is never reused.
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let index = self.matching_slot(id)?;
        let object = self.slots[index].object.take();
        self.slots[index].allocated = false;
        self.push_free_tail(index);
        self.len -= 1;
        object
    }

    /// Calls `cb` for every allocated slot, in slot order (not insertion order).
    pub fn for_each(&self, mut cb: impl FnMut(u32, &T)) {
        for slot in &self.slots {
            if slot.allocated {
                if let Some(object) = &slot.object {
                    cb(slot.id, object);
                }
            }
        }
    }

    pub fn for_each_mut(&mut self, mut cb: impl FnMut(u32, &mut T)) {
        for slot in &mut self.slots {
            if slot.allocated {
                if let Some(object) = &mut slot.object {
                    cb(slot.id, object);
                }
            }
        }
    }
}
