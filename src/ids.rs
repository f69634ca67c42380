//! # Thread Id Allocation
//!
//! Hands out the smallest free thread id. Ids index the thread table, and
//! callers rely on the deterministic reuse order, so the min-first policy is
//! part of the contract.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::config::MAIN_THREAD_ID;
use crate::thread::ThreadId;

/// Min-priority pool of free thread ids in `1..capacity`.
#[derive(Debug)]
pub struct IdAllocator {
    free: BinaryHeap<Reverse<ThreadId>>,
    capacity: usize,
}

impl IdAllocator {
    /// A pool holding every id in `0..capacity` except the main thread's.
    pub fn new(capacity: usize) -> Self {
        let free = (0..capacity)
            .filter(|&id| id != MAIN_THREAD_ID)
            .map(Reverse)
            .collect();
        Self { free, capacity }
    }

    /// Take the smallest free id, or `None` once every id is in use.
    pub fn take(&mut self) -> Option<ThreadId> {
        self.free.pop().map(|Reverse(id)| id)
    }

    /// Return an id to the pool. The id must currently be in use.
    pub fn release(&mut self, id: ThreadId) {
        debug_assert!(id != MAIN_THREAD_ID && id < self.capacity);
        debug_assert!(!self.free.iter().any(|&Reverse(free)| free == id));
        self.free.push(Reverse(id));
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}
