//! Helpers shared by the integration scenarios.
//!
//! Each scenario is a plain `main` (no libtest harness): the runtime owns the
//! process, and a scenario passes by terminating the main thread, which exits
//! with status 0. Thread bodies stick to atomics and library calls, since the
//! heap and stdout are not safe to use while preemptible.

#![allow(dead_code)]

use uthreads::sync::critical_section;

/// Short quantum, so scenarios finish quickly.
pub const QUANTUM_USECS: i64 = 10_000;

/// Burn user CPU time. The quantum timer only advances while the process
/// runs in user mode, so waits spin here between library calls.
pub fn burn() {
    for _ in 0..10_000 {
        std::hint::spin_loop();
    }
}

pub fn wait_until(cond: impl Fn() -> bool) {
    while !cond() {
        burn();
    }
}

/// Spin until `count` more quanta have started.
pub fn wait_quanta(count: u64) {
    let target = uthreads::get_total_quantums() + count;
    wait_until(|| uthreads::get_total_quantums() >= target);
}

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
    uthreads::init(QUANTUM_USECS).unwrap();
}

/// Report success and end the process through the library.
pub fn pass(name: &str) -> ! {
    critical_section(|_cs| println!("test {name} ... ok"));
    let _ = uthreads::terminate(uthreads::MAIN_THREAD_ID);
    unreachable!("terminating the main thread ends the process")
}
