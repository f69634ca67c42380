//! # Kernel
//!
//! Process-wide runtime and public API of the thread library.
//!
//! The kernel owns the single [`Scheduler`] and the quantum timer, validates
//! requests, reports errors on their channels, and carries out the context
//! switches the scheduler decides on. Every public function runs inside a
//! critical section.
//!
//! ## Startup Sequence
//!
//! ```text
//! main()
//!   ├─► uthreads::init(quantum)   ← main thread becomes thread 0, quantum 1
//!   │     ├─► allocate the teardown (reaper) context
//!   │     ├─► install the SIGVTALRM handler
//!   │     └─► arm the first quantum
//!   ├─► uthreads::spawn(f) (×N)   ← threads 1.. join the ready queue
//!   └─► ... main keeps running until preempted, like any other thread
//! ```
//!
//! ## Context Switch Protocol
//!
//! 1. Mask preemption (the enclosing critical section).
//! 2. The scheduler updates the departing thread, picks the head of the ready
//!    queue, and counts the new quantum.
//! 3. Arm the timer for the new quantum.
//! 4. Save the departing context and resume the chosen one.
//! 5. The resumed thread leaves the critical section where it was switched
//!    out, which restores its signal mask, and returns to application code.
//!
//! Step 4 is one `swapcontext`. The code before it runs in the thread giving
//! up the CPU; the code after it runs only once that thread is chosen again.
//!
//! ## Termination
//!
//! Terminating the main thread or the running thread ends the process. The
//! kernel then resumes a dedicated teardown context on its own stack, which
//! releases every thread (including the stack the request came from) and
//! exits.

use std::cell::UnsafeCell;
use std::convert::identity;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};

use log::{debug, error, trace};

use crate::arch::{ExecutionContext, Stack};
use crate::config::{Quantum, MAIN_THREAD_ID, REAPER_STACK_SIZE};
use crate::error::{Error, SystemError, ThreadError};
use crate::scheduler::{LockOutcome, Scheduler, Switch, Termination};
use crate::sync::{self, CriticalSection};
use crate::thread::{EntryPoint, ThreadId, ThreadState};
use crate::timer::QuantumTimer;

// ---------------------------------------------------------------------------
// Global runtime
// ---------------------------------------------------------------------------

struct Runtime {
    scheduler: Scheduler,
    timer: QuantumTimer,
}

/// Context that tears the process down from a stack no thread owns.
struct Reaper {
    context: ExecutionContext,
    _stack: Stack,
}

/// Process-wide slot, only touched with preemption masked.
struct Global<T>(UnsafeCell<Option<T>>);

// SAFETY: there is a single OS thread of control; concurrent access from the
// timer handler is excluded by masking the signal around every access.
unsafe impl<T> Sync for Global<T> {}

impl<T> Global<T> {
    const fn empty() -> Self {
        Self(UnsafeCell::new(None))
    }

    fn slot(&self) -> *mut Option<T> {
        self.0.get()
    }
}

static RUNTIME: Global<Runtime> = Global::empty();
static REAPER: Global<Reaper> = Global::empty();
static EXIT_STATUS: AtomicI32 = AtomicI32::new(0);

/// Run `f` on the runtime. The borrow must end before any context switch.
fn with_runtime<R>(
    _cs: &CriticalSection,
    f: impl FnOnce(&mut Runtime) -> R,
) -> Result<R, ThreadError> {
    // SAFETY: preemption is masked (the token proves it), so the handler
    // cannot create a second reference while this one is alive.
    let slot = unsafe { &mut *RUNTIME.slot() };
    slot.as_mut().map(f).ok_or(ThreadError::NotInitialized)
}

// ---------------------------------------------------------------------------
// Error channels
// ---------------------------------------------------------------------------

/// Emit a usage error on the library channel, passing the result through.
fn report<T>(result: Result<T, ThreadError>) -> Result<T, ThreadError> {
    if let Err(err) = &result {
        error!("thread library error: {err}");
    }
    result
}

/// Split a core result: usage errors go back to the caller, system errors
/// end the process.
fn settle<T>(result: Result<T, Error>) -> Result<T, ThreadError> {
    match result {
        Ok(value) => Ok(value),
        Err(Error::Library(err)) => Err(err),
        Err(Error::System(err)) => fatal(err),
    }
}

/// Report a platform failure on the system channel and tear the process
/// down with status 1. Never returns.
pub(crate) fn fatal(err: SystemError) -> ! {
    error!("system error: {err}");
    shutdown(1)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the thread library.
///
/// Must be called once, before any other library function. The calling
/// flow becomes thread 0 (main), running in quantum 1. `quantum_usecs` is
/// the quantum length in microseconds of user CPU time and must be positive.
pub fn init(quantum_usecs: i64) -> Result<(), ThreadError> {
    let quantum = report(Quantum::from_micros(quantum_usecs))?;

    sync::critical_section(|cs| {
        // SAFETY: preemption is masked; no other reference to the slot exists.
        let slot = unsafe { &mut *RUNTIME.slot() };
        if slot.is_some() {
            return report(Err(ThreadError::AlreadyInitialized));
        }

        if let Err(err) = install_reaper() {
            fatal(err);
        }

        let timer = QuantumTimer::new(quantum);
        if let Err(err) = timer.install(on_quantum_expired) {
            fatal(err);
        }
        *slot = Some(Runtime {
            scheduler: Scheduler::new(launch_thread),
            timer,
        });

        if let Ok(Err(err)) = with_runtime(cs, |rt| rt.timer.arm()) {
            fatal(err);
        }
        debug!("initialized, quantum {}us", quantum.as_micros());
        Ok(())
    })
}

/// Create a thread that will run `entry`, appended to the ready queue.
///
/// Fails when the thread limit is reached. Returns the new thread's id, the
/// smallest one not in use.
pub fn spawn(entry: EntryPoint) -> Result<ThreadId, ThreadError> {
    sync::critical_section(|cs| {
        report(with_runtime(cs, |rt| rt.scheduler.spawn(entry)).and_then(settle))
    })
}

/// Terminate thread `tid`, releasing everything the library holds for it.
///
/// Terminating the main thread or the calling thread releases all threads
/// and ends the process with status 0; that call does not return. A mutex
/// held by the terminated thread is released on its behalf.
pub fn terminate(tid: ThreadId) -> Result<(), ThreadError> {
    sync::critical_section(|cs| {
        let outcome =
            report(with_runtime(cs, |rt| rt.scheduler.terminate(tid)).and_then(identity))?;
        match outcome {
            Termination::Thread => Ok(()),
            Termination::Process => {
                debug!("terminating thread {tid} ends the process");
                shutdown(0)
            }
        }
    })
}

/// Block thread `tid` until it is resumed.
///
/// The main thread cannot be blocked. Blocking a blocked thread has no
/// effect. A thread blocking itself gives up the CPU, and this call returns
/// once it has been resumed and scheduled again.
pub fn block(tid: ThreadId) -> Result<(), ThreadError> {
    sync::critical_section(|cs| {
        let decision = report(with_runtime(cs, |rt| rt.scheduler.block(tid)).and_then(settle))?;
        if let Some(switch) = decision {
            yield_cpu(cs, switch);
        }
        Ok(())
    })
}

/// Resume a thread blocked with [`block`].
///
/// Resuming a running or ready thread has no effect. A thread still waiting
/// for the mutex stays blocked until the mutex is handed to it.
pub fn resume(tid: ThreadId) -> Result<(), ThreadError> {
    sync::critical_section(|cs| {
        report(with_runtime(cs, |rt| rt.scheduler.resume(tid)).and_then(identity))
    })
}

/// Acquire the mutex, blocking until it is available.
///
/// Returns once the calling thread owns the mutex. Locking a mutex the
/// caller already holds is an error.
pub fn mutex_lock() -> Result<(), ThreadError> {
    sync::critical_section(|cs| loop {
        let outcome =
            report(with_runtime(cs, |rt| rt.scheduler.lock_mutex()).and_then(settle))?;
        let LockOutcome::Contended(switch) = outcome else {
            return Ok(());
        };

        yield_cpu(cs, switch);

        // Running again. Either the mutex was handed over on release, or this
        // thread only left the waiter queue and has to contend again.
        let owned = with_runtime(cs, |rt| rt.scheduler.holds_mutex(rt.scheduler.running_id()))?;
        if owned {
            return Ok(());
        }
    })
}

/// Release the mutex. The caller must hold it.
///
/// The first waiter that is not also blocked by request becomes the owner
/// and is made ready.
pub fn mutex_unlock() -> Result<(), ThreadError> {
    sync::critical_section(|cs| {
        report(with_runtime(cs, |rt| rt.scheduler.unlock_mutex()).and_then(identity))
    })
}

/// Id of the calling thread. Reports the main thread before `init`.
pub fn get_tid() -> ThreadId {
    sync::critical_section(|cs| {
        with_runtime(cs, |rt| rt.scheduler.running_id()).unwrap_or(MAIN_THREAD_ID)
    })
}

/// Quanta started since `init`, the current one included. 1 right after
/// `init`, 0 before it.
pub fn get_total_quantums() -> u64 {
    sync::critical_section(|cs| with_runtime(cs, |rt| rt.scheduler.total_quantums()).unwrap_or(0))
}

/// Quanta thread `tid` has started in the running state, the current one
/// included if it is running.
pub fn get_quantums(tid: ThreadId) -> Result<u64, ThreadError> {
    sync::critical_section(|cs| {
        report(with_runtime(cs, |rt| rt.scheduler.quantums_of(tid)).and_then(identity))
    })
}

/// Current owner of the mutex, if any.
pub fn mutex_owner() -> Result<Option<ThreadId>, ThreadError> {
    sync::critical_section(|cs| with_runtime(cs, |rt| rt.scheduler.mutex().owner()))
}

/// Current state of thread `tid`.
pub fn thread_state(tid: ThreadId) -> Result<ThreadState, ThreadError> {
    sync::critical_section(|cs| {
        with_runtime(cs, |rt| rt.scheduler.thread(tid).map(|t| t.state()))?
            .ok_or(ThreadError::UnknownThread(tid))
    })
}

// ---------------------------------------------------------------------------
// Context switching
// ---------------------------------------------------------------------------

/// Quantum expiry. Runs with the signal masked by the kernel; logs nothing.
extern "C" fn on_quantum_expired(_signal: libc::c_int) {
    sync::critical_section(|cs| match with_runtime(cs, |rt| rt.scheduler.preempt()) {
        Ok(Ok(switch)) => context_switch(cs, switch),
        Ok(Err(err)) => fatal(err),
        // Stray expiry before init or during teardown.
        Err(_) => {}
    });
}

/// Voluntary hand-off by the running thread (self-block, mutex contention).
/// Any expiry of the abandoned quantum is cancelled first.
fn yield_cpu(cs: &CriticalSection, switch: Switch) {
    if let Ok(Err(err)) = with_runtime(cs, |rt| rt.timer.disarm()) {
        fatal(err);
    }
    if let Err(err) = sync::discard_pending_preemption(cs) {
        fatal(err);
    }
    trace!("thread {} yields to thread {}", switch.from, switch.to);
    context_switch(cs, switch);
}

/// Carry out a scheduling decision: arm the new quantum, then save the
/// departing thread and resume the chosen one.
///
/// The departing thread returns from here only once it is scheduled again.
fn context_switch(cs: &CriticalSection, switch: Switch) {
    let contexts = with_runtime(cs, |rt| {
        rt.timer.arm()?;
        Ok::<_, SystemError>(rt.scheduler.contexts(switch))
    });

    let (from, to) = match contexts {
        Ok(Ok(Some(pair))) => pair,
        Ok(Err(err)) => fatal(err),
        Ok(Ok(None)) | Err(_) => return,
    };

    if switch.is_reselection() {
        return;
    }

    // SAFETY: preemption is masked, the runtime borrow has ended, and both
    // contexts live in boxed TCBs that outlive the switch.
    if let Err(err) = unsafe { ExecutionContext::switch(from, to) } {
        fatal(err);
    }
    // Switched back in.
}

/// First code run by every spawned thread.
extern "C" fn launch_thread() {
    let entry = sync::critical_section(|cs| with_runtime(cs, |rt| rt.scheduler.running_entry()));
    if let Ok(Some(entry)) = entry {
        entry();
    }

    // Returning from the entry point counts as the running thread terminating
    // itself, which ends the process.
    sync::critical_section(|cs| {
        if let Ok(tid) = with_runtime(cs, |rt| rt.scheduler.running_id()) {
            debug!("thread {tid} returned from its entry point, ending the process");
        }
        shutdown(0)
    })
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

fn install_reaper() -> Result<(), SystemError> {
    // SAFETY: called from `init` with preemption masked.
    let slot = unsafe { &mut *REAPER.slot() };
    if slot.is_none() {
        let mut stack = Stack::new(REAPER_STACK_SIZE)?;
        let context = ExecutionContext::capture(&mut stack, reap, &sync::preemption_set())?;
        *slot = Some(Reaper {
            context,
            _stack: stack,
        });
    }
    Ok(())
}

/// End the process with `status` after releasing every thread.
///
/// Preemption stays masked from here on. The release runs on the reaper's
/// stack, so the caller's own stack can be freed as well.
fn shutdown(status: i32) -> ! {
    if let Err(err) = sync::mask_preemption() {
        error!("system error: {err}");
    }

    // SAFETY: preemption is masked and no runtime borrow is alive here.
    if let Some(runtime) = unsafe { (*RUNTIME.slot()).as_ref() } {
        if let Err(err) = runtime.timer.disarm() {
            error!("system error: {err}");
        }
    }
    EXIT_STATUS.store(status, Ordering::SeqCst);

    // SAFETY: the reaper is never dropped, and its context was captured fresh.
    if let Some(reaper) = unsafe { (*REAPER.slot()).as_ref() } {
        let failure = unsafe { ExecutionContext::resume(&reaper.context) };
        error!("system error: {failure}");
    }

    // No teardown stack to move to.
    release_and_exit()
}

extern "C" fn reap() {
    release_and_exit()
}

fn release_and_exit() -> ! {
    let status = EXIT_STATUS.load(Ordering::SeqCst);

    // SAFETY: preemption is masked for good; no other flow runs again.
    if let Some(mut runtime) = unsafe { (*RUNTIME.slot()).take() } {
        let released = runtime.scheduler.release_all();
        debug!("released {released} thread stacks, exiting with status {status}");
    }

    log::logger().flush();
    process::exit(status)
}
