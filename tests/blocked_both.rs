//! A mutex waiter that is also explicitly blocked: resume alone does not wake
//! it, and an unlock that finds only such waiters leaves the mutex free.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use uthreads::sync::critical_section;
use uthreads::thread::BlockReasons;
use uthreads::ThreadState;

static ACQUIRED: AtomicBool = AtomicBool::new(false);

fn waiter() {
    uthreads::mutex_lock().unwrap();
    ACQUIRED.store(true, Ordering::SeqCst);
    uthreads::mutex_unlock().unwrap();
    loop {
        common::burn();
    }
}

fn main() {
    common::init();
    uthreads::mutex_lock().unwrap();

    let tid = uthreads::spawn(waiter).unwrap();
    let on_mutex = ThreadState::Blocked(BlockReasons::MUTEX);
    common::wait_until(|| uthreads::thread_state(tid) == Ok(on_mutex));

    uthreads::block(tid).unwrap();
    let both = uthreads::thread_state(tid).unwrap();
    assert_eq!(both, ThreadState::Blocked(BlockReasons::all()));
    assert_eq!(both.label(), "BLOCKED_BOTH");

    // Resuming clears only the explicit block.
    uthreads::resume(tid).unwrap();
    assert_eq!(uthreads::thread_state(tid), Ok(on_mutex));
    assert_eq!(on_mutex.label(), "BLOCKED_ON_MUTEX");

    // With every waiter also blocked, unlock leaves the mutex free and the
    // head waiter blocked for its other reason.
    uthreads::block(tid).unwrap();
    uthreads::mutex_unlock().unwrap();
    assert_eq!(uthreads::mutex_owner(), Ok(None));
    let requested = uthreads::thread_state(tid).unwrap();
    assert_eq!(requested, ThreadState::Blocked(BlockReasons::REQUESTED));
    assert_eq!(requested.label(), "BLOCKED");

    common::wait_quanta(3);
    assert!(!ACQUIRED.load(Ordering::SeqCst));

    // Once resumed, the waiter contends again and takes the free mutex.
    critical_section(|_cs| {
        uthreads::resume(tid).unwrap();
        assert_eq!(uthreads::thread_state(tid), Ok(ThreadState::Ready));
    });
    common::wait_until(|| ACQUIRED.load(Ordering::SeqCst));
    common::wait_until(|| uthreads::mutex_owner() == Ok(None));

    common::pass("blocked_both");
}
