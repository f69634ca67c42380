//! # Thread Control Block
//!
//! Defines the per-thread record kept in the scheduler's thread table:
//! identity, state, quantum accounting, and the saved execution context
//! together with the stack it runs on.

use bitflags::bitflags;
use nix::sys::signal::SigSet;

use crate::arch::{ExecutionContext, Stack};
use crate::config::{MAIN_THREAD_ID, STACK_SIZE};
use crate::error::SystemError;

/// Thread identifier. Doubles as the index into the scheduler's thread table.
pub type ThreadId = usize;

/// Application entry point of a spawned thread.
pub type EntryPoint = fn();

// ---------------------------------------------------------------------------
// Thread state machine
// ---------------------------------------------------------------------------

bitflags! {
    /// Independent reasons a thread may be held off the CPU.
    ///
    /// A thread may be blocked for both reasons at once; each is cleared
    /// separately, and the thread only becomes ready when none is left.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockReasons: u8 {
        /// Blocked by an explicit `block` request.
        const REQUESTED = 0b01;
        /// Waiting to acquire the mutex.
        const MUTEX = 0b10;
    }
}

/// Execution state of a thread.
///
/// ```text
///            spawn                 scheduled
///   ─────────────────► ┌───────┐ ──────────────► ┌─────────┐
///                      │ Ready │                 │ Running │
///                      └───────┘ ◄────────────── └─────────┘
///                        ▲   │    quantum expiry     │  │
///              resume /  │   │ block                 │  │ block / mutex contention
///       mutex handed off │   ▼                       │  │
///                      ┌─────────────────────────┐   │  │
///                      │ Blocked(REQUESTED|MUTEX)│ ◄─┘◄─┘
///                      └─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Currently executing. Exactly one thread is running at any time.
    Running,
    /// Waiting in the ready queue.
    Ready,
    /// Held off the CPU for at least one reason. Never empty.
    Blocked(BlockReasons),
}

impl ThreadState {
    /// Blocked by an explicit request (alone or together with the mutex).
    #[inline]
    pub fn is_block_requested(&self) -> bool {
        matches!(self, ThreadState::Blocked(r) if r.contains(BlockReasons::REQUESTED))
    }

    /// Waiting for the mutex (alone or together with an explicit block).
    #[inline]
    pub fn is_waiting_for_mutex(&self) -> bool {
        matches!(self, ThreadState::Blocked(r) if r.contains(BlockReasons::MUTEX))
    }

    /// Waiting for the mutex and for nothing else.
    #[inline]
    pub fn is_waiting_only_for_mutex(&self) -> bool {
        matches!(self, ThreadState::Blocked(r) if *r == BlockReasons::MUTEX)
    }

    /// Add a block reason. Running and ready threads become blocked.
    pub fn with_reason(self, reason: BlockReasons) -> ThreadState {
        match self {
            ThreadState::Blocked(r) => ThreadState::Blocked(r | reason),
            _ => ThreadState::Blocked(reason),
        }
    }

    /// Clear a block reason. A thread left with no reason becomes ready.
    /// Running and ready threads are unaffected.
    pub fn without_reason(self, reason: BlockReasons) -> ThreadState {
        match self {
            ThreadState::Blocked(r) => {
                let remaining = r - reason;
                if remaining.is_empty() {
                    ThreadState::Ready
                } else {
                    ThreadState::Blocked(remaining)
                }
            }
            other => other,
        }
    }

    /// Conventional upper-case label, used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ThreadState::Running => "RUNNING",
            ThreadState::Ready => "READY",
            ThreadState::Blocked(r) if r.is_all() => "BLOCKED_BOTH",
            ThreadState::Blocked(r) if *r == BlockReasons::MUTEX => "BLOCKED_ON_MUTEX",
            ThreadState::Blocked(_) => "BLOCKED",
        }
    }
}

// ---------------------------------------------------------------------------
// Thread Control Block
// ---------------------------------------------------------------------------

/// Thread Control Block (TCB), exclusively owned by the scheduler's thread table.
///
/// Field order matters on drop: the context is discarded before the stack it
/// points into.
pub struct ThreadControlBlock {
    id: ThreadId,
    state: ThreadState,
    /// Quanta this thread has started in the running state.
    quantums: u64,
    /// `None` for the main thread, which runs the process's own code.
    entry: Option<EntryPoint>,
    context: ExecutionContext,
    /// `None` for the main thread, which keeps the process stack.
    stack: Option<Stack>,
}

impl ThreadControlBlock {
    /// The TCB for the flow that called `init`. It is running and has started
    /// its first quantum.
    pub fn main() -> Self {
        Self {
            id: MAIN_THREAD_ID,
            state: ThreadState::Running,
            quantums: 1,
            entry: None,
            context: ExecutionContext::current(),
            stack: None,
        }
    }

    /// A ready thread with a fresh stack, whose first quantum starts in
    /// `launcher` with an open signal mask. `launcher` looks up and calls `entry`.
    pub fn spawn(
        id: ThreadId,
        entry: EntryPoint,
        launcher: extern "C" fn(),
    ) -> Result<Self, SystemError> {
        let mut stack = Stack::new(STACK_SIZE)?;
        let context = ExecutionContext::capture(&mut stack, launcher, &SigSet::empty())?;

        Ok(Self {
            id,
            state: ThreadState::Ready,
            quantums: 0,
            entry: Some(entry),
            context,
            stack: Some(stack),
        })
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    #[inline]
    pub fn quantums(&self) -> u64 {
        self.quantums
    }

    #[inline]
    pub fn entry(&self) -> Option<EntryPoint> {
        self.entry
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.id == MAIN_THREAD_ID
    }

    #[inline]
    pub fn owns_stack(&self) -> bool {
        self.stack.is_some()
    }

    pub(crate) fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Move into the running state for a new quantum.
    pub(crate) fn start_quantum(&mut self) {
        self.state = ThreadState::Running;
        self.quantums += 1;
    }

    pub(crate) fn context_ptr(&mut self) -> *mut ExecutionContext {
        &mut self.context
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
