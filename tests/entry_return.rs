//! A thread returning from its entry function terminates itself, which ends
//! the process with status 0 after every thread has been released.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use uthreads::arch::live_stacks;

static RAN: AtomicBool = AtomicBool::new(false);

fn short_lived() {
    RAN.store(true, Ordering::SeqCst);
}

extern "C" fn check_exit() {
    let remaining = live_stacks();
    if !RAN.load(Ordering::SeqCst) || remaining != 1 {
        eprintln!("test entry_return ... FAILED: {remaining} stacks left at exit");
        // SAFETY: ends the process without rerunning exit handlers.
        unsafe { libc::_exit(1) };
    }
    println!("test entry_return ... ok");
}

fn main() {
    common::init();
    // SAFETY: registers a plain extern "C" function with no captured state.
    assert_eq!(unsafe { libc::atexit(check_exit) }, 0);

    uthreads::spawn(short_lived).unwrap();
    assert_eq!(live_stacks(), 2);

    // Main never terminates itself; the returning thread ends the process.
    loop {
        common::burn();
    }
}
