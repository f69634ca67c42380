//! # uthreads - User-Level Threads
//!
//! A many-to-one thread library for Linux: any number of user threads are
//! multiplexed onto the single OS thread of the calling process, scheduled
//! preemptively in round-robin order by a virtual-time quantum timer.
//!
//! ## Overview
//!
//! The process's initial flow of control becomes thread 0 (main). Further
//! threads are created with [`spawn`]; each gets its own stack and starts in
//! its entry function. Every thread runs for one quantum of user CPU time
//! before the next thread in the ready queue takes over. Threads can block
//! and resume one another, and coordinate through one process-wide mutex.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 Application Threads                     │
//! ├────────────────────────────────────────────────────────┤
//! │               Kernel API (kernel.rs)                    │
//! │   init · spawn · terminate · block · resume · mutex_*  │
//! ├──────────────┬───────────────────┬─────────────────────┤
//! │  Scheduler   │   Mutex           │  Sync Primitives    │
//! │  scheduler.rs│   mutex.rs        │  sync.rs            │
//! │  ─ preempt() │   ─ acquire()     │  ─ critical_section │
//! │  ─ block()   │   ─ release()     │                     │
//! │  ─ resume()  │                   │  Timer (timer.rs)   │
//! ├──────────────┴───────────────────┴─────────────────────┤
//! │   Thread Model (thread.rs) · Id Allocator (ids.rs)      │
//! │   TCB · ThreadState · BlockReasons                      │
//! ├────────────────────────────────────────────────────────┤
//! │          Arch Port (arch/ucontext.rs)                   │
//! │   Stack · ExecutionContext · switch · resume            │
//! ├────────────────────────────────────────────────────────┤
//! │      Linux / glibc (ucontext, setitimer, SIGVTALRM)     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread States
//!
//! | State | Where it lives | Leaves by |
//! |-------|----------------|-----------|
//! | Running | `running` | preemption, self-block, mutex contention |
//! | Ready | ready queue | being scheduled |
//! | Blocked (requested) | blocked set | [`resume`] |
//! | Blocked (mutex) | mutex queue | mutex hand-off |
//! | Blocked (both) | blocked set and mutex queue | both of the above |
//!
//! ## Errors
//!
//! Misuse of the API (bad ids, blocking main, relocking the mutex, ...) is a
//! [`ThreadError`]: it is logged as `thread library error: ...` and returned
//! to the caller, with no state changed. Platform failures are
//! [`SystemError`]s: they are logged as `system error: ...` and end the
//! process with status 1.
//!
//! ## Preemption safety
//!
//! Thread bodies run preemptible. Code that must not be interrupted by a
//! context switch, including anything that takes a process-wide lock such as
//! the heap allocator or stdout, belongs inside [`sync::critical_section`].
//!
//! ## Memory Model
//!
//! - **Thread table**: `MAX_THREADS` slots, id 0 reserved for main
//! - **Per-thread stack**: `STACK_SIZE` bytes on the heap, released on
//!   termination
//! - **Saved contexts**: boxed, so they never move while a thread lives

pub mod arch;
pub mod config;
pub mod error;
pub mod ids;
pub mod kernel;
pub mod mutex;
pub mod scheduler;
pub mod sync;
pub mod thread;
pub mod timer;

pub use config::{Quantum, MAIN_THREAD_ID, MAX_THREADS, STACK_SIZE};
pub use error::{Error, SystemError, ThreadError};
pub use kernel::{
    block, get_quantums, get_tid, get_total_quantums, init, mutex_lock, mutex_owner,
    mutex_unlock, resume, spawn, terminate, thread_state,
};
pub use thread::{EntryPoint, ThreadId, ThreadState};
