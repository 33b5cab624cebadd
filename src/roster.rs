//! Fixed roster of worker slots and the circular sibling ring.
//!
//! Populated once during pool initialization and read-only afterwards.
//! Worker ids index directly into the slot array. The sibling ring is an
//! array of successor ids forming a cycle through every worker, main
//! included, so enumeration needs no pointer graph.

use crossbeam::utils::CachePadded;

use crate::slot::Slot;

/// Identifies a managed worker. Small, dense, stable for the process
/// lifetime.
pub type WorkerId = usize;

/// Id of the thread that initialized the pool.
pub const MAIN_ID: WorkerId = 0;

pub(crate) struct Roster {
    /// One slot per worker, indexed by id. Padded so neighboring slots do
    /// not share a cache line under contention.
    slots: Box<[CachePadded<Slot>]>,
    /// Successor id in the circular sibling ring.
    next_sibling: Box<[WorkerId]>,
}

impl Roster {
    /// Builds a roster of `count` slots with every new id spliced into the
    /// ring right after main.
    pub(crate) fn new(count: usize) -> Self {
        assert!(count >= 1);
        let slots = (0..count)
            .map(|id| CachePadded::new(Slot::new(id)))
            .collect();

        let mut next_sibling = vec![MAIN_ID; count];
        for id in 1..count {
            next_sibling[id] = next_sibling[MAIN_ID];
            next_sibling[MAIN_ID] = id;
        }

        Roster {
            slots,
            next_sibling: next_sibling.into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn slot(&self, id: WorkerId) -> &Slot {
        &self.slots[id]
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn contains(&self, id: WorkerId) -> bool {
        id < self.slots.len()
    }

    /// Snapshot of every worker id, in sibling-ring order starting at main.
    pub(crate) fn cycle(&self) -> Vec<WorkerId> {
        let mut ids = Vec::with_capacity(self.len());
        let mut id = MAIN_ID;
        loop {
            ids.push(id);
            id = self.next_sibling[id];
            if id == MAIN_ID {
                break;
            }
        }
        ids
    }
}
