//! # uthreads Configuration
//!
//! Compile-time constants governing the thread table and stacks, plus the
//! validated quantum length supplied at `init`. Everything except the
//! quantum is fixed at compile time.

use core::num::NonZeroU64;

use crate::error::ThreadError;

/// Maximum number of threads that may be alive at once, main thread included.
/// Thread ids are drawn from `0..MAX_THREADS`.
pub const MAX_THREADS: usize = 100;

/// Stack size in bytes for every spawned thread. The main thread keeps the
/// process stack and owns no library stack.
pub const STACK_SIZE: usize = 64 * 1024;

/// Stack size of the teardown context that releases all threads before exit.
pub const REAPER_STACK_SIZE: usize = 64 * 1024;

/// Id of the main thread. Reserved at init, never handed out by the allocator.
pub const MAIN_THREAD_ID: usize = 0;

pub const MICROS_PER_SECOND: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Quantum
// ---------------------------------------------------------------------------

/// Length of one scheduling quantum, in microseconds of virtual (user CPU) time.
///
/// Immutable once the library is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantum(NonZeroU64);

impl Quantum {
    /// Validate a caller-supplied quantum. Zero and negative lengths are rejected.
    pub fn from_micros(micros: i64) -> Result<Self, ThreadError> {
        u64::try_from(micros)
            .ok()
            .and_then(NonZeroU64::new)
            .map(Quantum)
            .ok_or(ThreadError::InvalidQuantum(micros))
    }

    #[inline]
    pub fn as_micros(&self) -> u64 {
        self.0.get()
    }

    /// Split into the `(seconds, microseconds)` pair a `timeval` expects.
    #[inline]
    pub fn as_timeval_parts(&self) -> (u64, u64) {
        (
            self.as_micros() / MICROS_PER_SECOND,
            self.as_micros() % MICROS_PER_SECOND,
        )
    }
}
