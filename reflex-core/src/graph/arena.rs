//! Generational Arena
//!
//! Slot storage for graph nodes. Freed slots are reused, and each reuse bumps
//! the slot generation so ids held by stale handles stop resolving.

use super::node::NodeId;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena addressed by [`NodeId`].
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value and return its id.
    pub(crate) fn insert(&mut self, value: T) -> NodeId {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                NodeId::from_parts(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("node arena exhausted");
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                NodeId::from_parts(index, 0)
            }
        }
    }

    /// Remove a value, freeing its slot.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
