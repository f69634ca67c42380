//! # uthreads Demo
//!
//! Runs three user threads next to main and prints how the CPU was shared:
//!
//! | Thread | Behavior |
//! |--------|----------|
//! | `busy_thread` | Spins forever; leaves the CPU only when preempted |
//! | `locking_thread` | Repeatedly takes the mutex and holds it for a while |
//! | `sleeping_thread` | Blocks itself after every burst; main resumes it |
//!
//! Usage: `uthreads [QUANTUM_USECS] [TOTAL_QUANTA]`, logging controlled
//! by `RUST_LOG` (e.g. `RUST_LOG=debug`).
//!
//! ## Expected Output
//!
//! Every thread ends with roughly a third to a quarter of the quanta, since
//! round robin gives each ready thread one quantum per cycle. The sleeping
//! thread gets fewer, as it spends time blocked until main resumes it.

use std::sync::atomic::{AtomicU64, Ordering};

use uthreads::sync::critical_section;
use uthreads::ThreadId;

static BUSY_ITERATIONS: AtomicU64 = AtomicU64::new(0);
static CRITICAL_PASSES: AtomicU64 = AtomicU64::new(0);
static WAKEUPS: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Thread entry points
// ---------------------------------------------------------------------------

fn busy_thread() {
    loop {
        BUSY_ITERATIONS.fetch_add(1, Ordering::Relaxed);
    }
}

fn locking_thread() {
    loop {
        if uthreads::mutex_lock().is_err() {
            return;
        }
        // Hold the lock across at least one preemption.
        let start = uthreads::get_total_quantums();
        while uthreads::get_total_quantums() < start + 2 {
            std::hint::spin_loop();
        }
        CRITICAL_PASSES.fetch_add(1, Ordering::Relaxed);
        let _ = uthreads::mutex_unlock();
    }
}

fn sleeping_thread() {
    loop {
        for _ in 0..100_000 {
            std::hint::spin_loop();
        }
        WAKEUPS.fetch_add(1, Ordering::Relaxed);
        let _ = uthreads::block(uthreads::get_tid());
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let quantum: i64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let total: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(200);

    if uthreads::init(quantum).is_err() {
        std::process::exit(1);
    }

    let threads: Vec<ThreadId> = [busy_thread as fn(), locking_thread, sleeping_thread]
        .into_iter()
        .filter_map(|entry| uthreads::spawn(entry).ok())
        .collect();
    let sleeper = threads.last().copied();

    while uthreads::get_total_quantums() < total {
        if let Some(tid) = sleeper {
            let _ = uthreads::resume(tid);
        }
        std::hint::spin_loop();
    }

    critical_section(|_cs| {
        println!("{total} quanta of {quantum}us");
        println!("  main: {} quanta", uthreads::get_quantums(0).unwrap_or(0));
        for &tid in &threads {
            let quanta = uthreads::get_quantums(tid).unwrap_or(0);
            println!("  thread {tid}: {quanta} quanta");
        }
        println!(
            "  busy iterations {}, mutex passes {}, wakeups {}",
            BUSY_ITERATIONS.load(Ordering::Relaxed),
            CRITICAL_PASSES.load(Ordering::Relaxed),
            WAKEUPS.load(Ordering::Relaxed),
        );
    });

    // Terminating main releases every thread and exits.
    let _ = uthreads::terminate(uthreads::MAIN_THREAD_ID);
}
