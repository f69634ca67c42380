//! # Quantum Timer
//!
//! One-shot virtual interval timer (`ITIMER_VIRTUAL`) that delivers
//! `SIGVTALRM` after one quantum of user CPU time. It never repeats: it is
//! rearmed explicitly every time a thread enters the running state, and
//! disarmed when the running thread gives up the CPU voluntarily.

use std::io;
use std::ptr;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler};

use crate::config::Quantum;
use crate::error::SystemError;
use crate::sync::{preemption_set, PREEMPTION_SIGNAL};

pub struct QuantumTimer {
    quantum: Quantum,
}

impl QuantumTimer {
    pub fn new(quantum: Quantum) -> Self {
        Self { quantum }
    }

    #[inline]
    pub fn quantum(&self) -> Quantum {
        self.quantum
    }

    /// Route quantum expiry to `handler`. The handler runs with the expiry
    /// signal masked, and interrupted system calls are restarted.
    pub fn install(&self, handler: extern "C" fn(libc::c_int)) -> Result<(), SystemError> {
        let action = SigAction::new(
            SigHandler::Handler(handler),
            SaFlags::SA_RESTART,
            preemption_set(),
        );
        // SAFETY: the handler only touches scheduler state inside a critical
        // section and never returns into a half-updated scheduler.
        unsafe { sigaction(PREEMPTION_SIGNAL, &action) }
            .map(drop)
            .map_err(SystemError::SignalHandler)
    }

    /// Start a fresh quantum, replacing any expiry still outstanding.
    pub fn arm(&self) -> Result<(), SystemError> {
        let (secs, micros) = self.quantum.as_timeval_parts();
        self.set(libc::timeval {
            tv_sec: secs as libc::time_t,
            tv_usec: micros as libc::suseconds_t,
        })
    }

    /// Cancel the outstanding expiry, if any.
    pub fn disarm(&self) -> Result<(), SystemError> {
        self.set(libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        })
    }

    fn set(&self, value: libc::timeval) -> Result<(), SystemError> {
        let timer = libc::itimerval {
            it_interval: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            it_value: value,
        };
        // SAFETY: `timer` is a valid itimerval; the old value is not requested.
        if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut()) } == -1 {
            return Err(SystemError::Timer(io::Error::last_os_error()));
        }
        Ok(())
    }
}
