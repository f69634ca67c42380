//! # Mutex
//!
//! The library's single binary lock: an owner and a FIFO queue of waiting
//! threads. This module holds the lock's own bookkeeping and hand-off policy;
//! moving threads between scheduler collections is done by the scheduler.
//!
//! ## Hand-off on release
//!
//! 1. The first waiter (FIFO order) that waits *only* for the mutex becomes the
//!    owner and leaves the queue.
//! 2. If every waiter is also explicitly blocked, the head waiter leaves the
//!    queue without becoming owner; the lock stays unlocked.
//! 3. With no waiters the lock simply becomes unlocked.

use std::collections::VecDeque;

use crate::thread::ThreadId;

/// Result of a lock attempt by the running thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The lock was free and now belongs to the caller.
    Acquired,
    /// The caller already holds the lock.
    AlreadyOwned,
    /// Another thread holds the lock.
    Contended,
}

/// What a release did with the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// No waiters, the lock is now unlocked.
    Unlocked,
    /// Ownership passed to this waiter, which must be made ready.
    Granted(ThreadId),
    /// This waiter left the queue without ownership, since it is also
    /// explicitly blocked. The lock is unlocked.
    Dequeued(ThreadId),
}

#[derive(Debug, Default)]
pub struct Mutex {
    owner: Option<ThreadId>,
    waiters: VecDeque<ThreadId>,
}

impl Mutex {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// Waiting thread ids in FIFO order.
    pub fn waiters(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.waiters.iter().copied()
    }

    pub fn is_waiting(&self, id: ThreadId) -> bool {
        self.waiters.contains(&id)
    }

    /// Try to take the lock for `caller`. Does not enqueue on contention.
    pub(crate) fn acquire(&mut self, caller: ThreadId) -> Acquire {
        match self.owner {
            None => {
                self.owner = Some(caller);
                Acquire::Acquired
            }
            Some(owner) if owner == caller => Acquire::AlreadyOwned,
            Some(_) => Acquire::Contended,
        }
    }

    pub(crate) fn enqueue(&mut self, id: ThreadId) {
        debug_assert!(!self.is_waiting(id));
        self.waiters.push_back(id);
    }

    /// Drop `id` from the waiter queue, if present.
    pub(crate) fn remove_waiter(&mut self, id: ThreadId) -> bool {
        match self.waiters.iter().position(|&w| w == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Release the lock and pick the next owner. `waits_only_for_mutex` tells
    /// whether a waiter is free to run once it gets the lock.
    ///
    /// The caller must have checked ownership.
    pub(crate) fn release<F>(&mut self, waits_only_for_mutex: F) -> Handoff
    where
        F: Fn(ThreadId) -> bool,
    {
        self.owner = None;

        if let Some(pos) = self.waiters.iter().position(|&w| waits_only_for_mutex(w)) {
            if let Some(id) = self.waiters.remove(pos) {
                self.owner = Some(id);
                return Handoff::Granted(id);
            }
        }

        match self.waiters.pop_front() {
            Some(id) => Handoff::Dequeued(id),
            None => Handoff::Unlocked,
        }
    }
}
