//! # System V `ucontext` Port
//!
//! Execution contexts for Linux/glibc, built on `getcontext`, `makecontext`,
//! `swapcontext` and `setcontext`.
//!
//! ## Contract
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`ExecutionContext::capture`] | Builds a never-run context that starts at `entry` on a dedicated stack. No code runs yet. |
//! | [`ExecutionContext::switch`] | Saves the caller into `from` and resumes `to`. Returns in the caller only when a later switch or resume targets `from` again. |
//! | [`ExecutionContext::resume`] | Resumes `to` without saving anything. Returns only if the platform refused. |
//!
//! A save and the matching resume are fused into one `switch` call: code placed
//! before the call runs in the flow that gives up the CPU, code placed after it
//! runs when that flow has been switched back into. A Rust function cannot
//! soundly return twice, so the setjmp-style discriminant is expressed by the
//! two sides of the call instead of a return value.
//!
//! ## Signal mask
//!
//! Each context carries its own signal mask, restored on every switch into it.
//! A fresh context starts with the mask given to `capture`.

use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::sys::signal::SigSet;

use crate::error::SystemError;

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

static LIVE_STACKS: AtomicUsize = AtomicUsize::new(0);

/// Number of library-allocated stacks currently alive (thread stacks plus the
/// teardown stack). Lets a harness verify that every stack is released.
pub fn live_stacks() -> usize {
    LIVE_STACKS.load(Ordering::SeqCst)
}

/// A fixed-size call stack, exclusively owned by one thread (or by the
/// teardown context). Released exactly once, when dropped.
pub struct Stack {
    memory: Box<[u8]>,
}

impl Stack {
    /// Allocate a zeroed stack of `size` bytes. Allocation failure is reported
    /// instead of aborting.
    pub fn new(size: usize) -> Result<Self, SystemError> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(size)
            .map_err(|_| SystemError::StackAllocation { size })?;
        memory.resize(size, 0u8);

        LIVE_STACKS.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            memory: memory.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    fn base(&mut self) -> *mut u8 {
        self.memory.as_mut_ptr()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        LIVE_STACKS.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Execution contexts
// ---------------------------------------------------------------------------

/// Saved machine state of one suspended flow of control.
///
/// The `ucontext_t` is boxed because glibc stores pointers into the structure
/// itself (the floating-point save area); it must never move once captured.
pub struct ExecutionContext {
    inner: Box<libc::ucontext_t>,
}

impl ExecutionContext {
    /// An empty context for a flow that is already executing on its own stack
    /// (the main thread). It is filled in the first time that flow switches away.
    pub fn current() -> Self {
        // SAFETY: ucontext_t is a plain C struct; all-zero is a valid bit pattern.
        let blank = unsafe { MaybeUninit::<libc::ucontext_t>::zeroed().assume_init() };
        Self {
            inner: Box::new(blank),
        }
    }

    /// Build a never-run context whose first resumption calls `entry` on
    /// `stack`, with `entry_mask` as its signal mask.
    ///
    /// `entry` must never return: the context has no successor.
    /// The caller must keep `stack` alive for as long as the context may run.
    pub fn capture(
        stack: &mut Stack,
        entry: extern "C" fn(),
        entry_mask: &SigSet,
    ) -> Result<Self, SystemError> {
        let mut context = Self::current();
        let uc: *mut libc::ucontext_t = &mut *context.inner;

        // SAFETY: `uc` points into a live, pinned allocation; the stack region
        // is valid for `stack.size()` bytes.
        unsafe {
            if libc::getcontext(uc) == -1 {
                return Err(SystemError::ContextCapture(io::Error::last_os_error()));
            }
            (*uc).uc_stack.ss_sp = stack.base().cast();
            (*uc).uc_stack.ss_size = stack.size();
            (*uc).uc_stack.ss_flags = 0;
            (*uc).uc_link = ptr::null_mut();
            (*uc).uc_sigmask = *entry_mask.as_ref();
            libc::makecontext(uc, entry, 0);
        }

        Ok(context)
    }

    /// Save the calling flow into `from` and resume `to`.
    ///
    /// # Safety
    /// Both pointers must refer to live contexts that stay at the same address
    /// until they are resumed or dropped, with no outstanding references to
    /// either. `to` must be either freshly captured or previously saved.
    pub unsafe fn switch(
        from: *mut ExecutionContext,
        to: *const ExecutionContext,
    ) -> Result<(), SystemError> {
        let from_uc: *mut libc::ucontext_t = &mut *(*from).inner;
        let to_uc: *const libc::ucontext_t = &*(*to).inner;

        if libc::swapcontext(from_uc, to_uc) == -1 {
            return Err(SystemError::ContextSwitch(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Resume `to`, abandoning the calling flow. Returns only if the platform
    /// refused the switch, yielding the failure.
    ///
    /// # Safety
    /// Same requirements on `to` as [`ExecutionContext::switch`].
    pub unsafe fn resume(to: *const ExecutionContext) -> SystemError {
        let to_uc: *const libc::ucontext_t = &*(*to).inner;
        libc::setcontext(to_uc);
        SystemError::ContextSwitch(io::Error::last_os_error())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
