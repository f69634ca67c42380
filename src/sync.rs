//! # Synchronization Primitives
//!
//! Preemption-safe critical sections. All scheduler state is mutated inside
//! one, so the quantum timer's handler can never observe it half-updated.
//!
//! There is only one flow of control at a time, so this is reentrancy
//! exclusion rather than mutual exclusion: a critical section masks the
//! timer signal (`SIGVTALRM`) and restores the previous mask on exit.
//! Sections nest, and a thread switched out inside a section finds its own
//! mask restored when it is switched back in.

use core::marker::PhantomData;

use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};

use crate::error::SystemError;
use crate::kernel;

/// Signal that delivers quantum expiry.
pub const PREEMPTION_SIGNAL: Signal = Signal::SIGVTALRM;

/// Proof that preemption is masked. Handed to the closure of
/// [`critical_section`]; required by every runtime accessor.
pub struct CriticalSection {
    // Not Send/Sync: a signal mask belongs to one OS thread.
    _not_send: PhantomData<*const ()>,
}

impl CriticalSection {
    /// # Safety
    /// Preemption must actually be masked for the token's lifetime.
    pub(crate) unsafe fn assume_masked() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

/// The signal set masked by a critical section.
pub fn preemption_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(PREEMPTION_SIGNAL);
    set
}

/// Execute a closure with preemption masked.
///
/// Application threads can use this too, around code that must not be
/// interrupted by a context switch, such as heap allocation or printing:
/// a thread preempted while holding the allocator's lock would otherwise
/// stall every thread that allocates after it.
///
/// A failure to change the signal mask is fatal.
///
/// ```ignore
/// uthreads::sync::critical_section(|_cs| {
///     println!("not interleaved with other threads");
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let previous = match mask_preemption() {
        Ok(previous) => previous,
        Err(err) => kernel::fatal(err),
    };

    // SAFETY: the mask was installed just above.
    let cs = unsafe { CriticalSection::assume_masked() };
    let result = f(&cs);

    if let Err(err) = restore_mask(&previous) {
        kernel::fatal(err);
    }
    result
}

/// Mask the preemption signal, returning the mask that was in effect before.
pub(crate) fn mask_preemption() -> Result<SigSet, SystemError> {
    let mut previous = SigSet::empty();
    sigprocmask(
        SigmaskHow::SIG_BLOCK,
        Some(&preemption_set()),
        Some(&mut previous),
    )
    .map_err(SystemError::SignalMask)?;
    Ok(previous)
}

pub(crate) fn restore_mask(previous: &SigSet) -> Result<(), SystemError> {
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(previous), None).map_err(SystemError::SignalMask)
}

/// Consume a quantum expiry that fired while preemption was masked, so it is
/// not delivered against the next thread's fresh quantum.
pub(crate) fn discard_pending_preemption(_cs: &CriticalSection) -> Result<(), SystemError> {
    // SAFETY: sigset_t is plain data; sigemptyset initializes it below.
    let mut pending: libc::sigset_t = unsafe { core::mem::zeroed() };
    let pending_now = unsafe {
        libc::sigemptyset(&mut pending);
        if libc::sigpending(&mut pending) == -1 {
            return Err(SystemError::SignalMask(nix::Error::last()));
        }
        libc::sigismember(&pending, PREEMPTION_SIGNAL as libc::c_int) == 1
    };

    if pending_now {
        // The signal is masked, so sigwait takes it without running the handler.
        preemption_set().wait().map_err(SystemError::SignalMask)?;
    }
    Ok(())
}
