//! # Error Types
//!
//! Two classes of failure, reported on two channels:
//!
//! | Class | Type | Channel prefix | Outcome |
//! |-------|------|----------------|---------|
//! | Usage error | [`ThreadError`] | `thread library error:` | returned to the caller, library stays usable |
//! | Platform failure | [`SystemError`] | `system error:` | fatal, all threads released, process exits with status 1 |

use thiserror::Error;

use crate::thread::ThreadId;

/// A rejected request. The library state is unchanged and remains usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    #[error("invalid quantum length {0}us, must be a positive number of microseconds")]
    InvalidQuantum(i64),

    #[error("the thread library is already initialized")]
    AlreadyInitialized,

    #[error("the thread library is not initialized")]
    NotInitialized,

    #[error("no thread with id {0}")]
    UnknownThread(ThreadId),

    #[error("the main thread cannot be blocked")]
    BlockMainThread,

    #[error("the main thread cannot be resumed")]
    ResumeMainThread,

    #[error("cannot add new thread, {max} threads are already alive")]
    TooManyThreads {
        /// The compile-time thread limit that was hit.
        max: usize,
    },

    #[error("thread {0} already holds the mutex")]
    MutexAlreadyOwned(ThreadId),

    #[error("thread {0} does not hold the mutex")]
    MutexNotOwned(ThreadId),
}

/// A failure of an underlying platform primitive, or a state from which no
/// thread can ever run again. Never returned to application code.
#[derive(Error, Debug)]
pub enum SystemError {
    #[error("failed to change the signal mask: {0}")]
    SignalMask(#[source] nix::Error),

    #[error("failed to install the preemption handler: {0}")]
    SignalHandler(#[source] nix::Error),

    #[error("failed to configure the quantum timer: {0}")]
    Timer(#[source] std::io::Error),

    #[error("failed to capture an execution context: {0}")]
    ContextCapture(#[source] std::io::Error),

    #[error("failed to switch execution context: {0}")]
    ContextSwitch(#[source] std::io::Error),

    #[error("failed to allocate a {size} byte thread stack")]
    StackAllocation {
        /// Requested stack size in bytes.
        size: usize,
    },

    #[error("no thread is ready to run, every live thread is blocked")]
    Deadlock,
}

/// Any failure raised inside the scheduler core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("thread library error: {0}")]
    Library(#[from] ThreadError),

    #[error("system error: {0}")]
    System(#[from] SystemError),
}

pub type Result<T> = std::result::Result<T, Error>;
