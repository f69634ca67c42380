//! # Scheduler
//!
//! Core scheduling bookkeeping: the thread table, the ready queue, the
//! blocked set, the mutex, and quantum accounting. Every thread state
//! transition happens here.
//!
//! The scheduler itself never touches signals, timers, or machine state.
//! Operations that end the caller's quantum return a [`Switch`] describing
//! which context to save and which to resume; the kernel layer carries it
//! out inside a critical section. This keeps the scheduler usable (and
//! testable) as a plain value.
//!
//! ## Scheduling Algorithm
//!
//! Strict FIFO round robin. The head of the ready queue is always the next
//! thread to run. Every transition into the running state starts a new
//! quantum, whatever its cause (preemption, self-block, mutex contention):
//! the chosen thread's quantum count and the total count both grow by one.
//!
//! ## Placement invariant
//!
//! Outside a critical section every live thread sits exactly where its state
//! says: the running thread in `running`, ready threads in the ready queue,
//! explicitly blocked threads in the blocked set, and mutex waiters in the
//! mutex queue (a thread blocked for both reasons sits in both).

use std::collections::{BTreeSet, VecDeque};

use log::debug;

use crate::arch::ExecutionContext;
use crate::config::{MAIN_THREAD_ID, MAX_THREADS};
use crate::error::{Result, SystemError, ThreadError};
use crate::ids::IdAllocator;
use crate::mutex::{Acquire, Handoff, Mutex};
use crate::thread::{BlockReasons, EntryPoint, ThreadControlBlock, ThreadId, ThreadState};

// ---------------------------------------------------------------------------
// Scheduling decisions
// ---------------------------------------------------------------------------

/// A context switch decided by the scheduler: save `from`, resume `to`.
///
/// By the time a `Switch` is returned, `to` is already the running thread and
/// its new quantum has been counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: ThreadId,
    pub to: ThreadId,
}

impl Switch {
    /// The departing thread was chosen again (it was alone in the ready queue).
    /// A new quantum starts but no context needs to change.
    #[inline]
    pub fn is_reselection(&self) -> bool {
        self.from == self.to
    }
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The thread was destroyed; scheduling continues undisturbed.
    Thread,
    /// The main or running thread was named: the whole process must end.
    Process,
}

/// Outcome of a lock request by the running thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// The caller now waits for the mutex; the switch hands the CPU on.
    Contended(Switch),
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state.
///
/// ## Design Notes
///
/// - The thread table is indexed by thread id; it owns every live TCB
/// - The ready queue, blocked set and mutex queue hold ids only
/// - Thread 0 (main) exists from construction until process teardown
pub struct Scheduler {
    threads: Vec<Option<ThreadControlBlock>>,
    ready: VecDeque<ThreadId>,
    blocked: BTreeSet<ThreadId>,
    running: ThreadId,
    ids: IdAllocator,
    total_quantums: u64,
    mutex: Mutex,
    /// First code run by every spawned thread.
    launcher: extern "C" fn(),
}

impl Scheduler {
    /// Create a scheduler whose only thread is the running main thread, in
    /// its first quantum.
    ///
    /// The ready queue is sized for every thread up front: it is pushed to
    /// from the timer signal handler, which must not allocate.
    pub fn new(launcher: extern "C" fn()) -> Self {
        let mut threads: Vec<Option<ThreadControlBlock>> =
            (0..MAX_THREADS).map(|_| None).collect();
        let main = ThreadControlBlock::main();
        let running = main.id();
        threads[running] = Some(main);

        Self {
            threads,
            ready: VecDeque::with_capacity(MAX_THREADS),
            blocked: BTreeSet::new(),
            running,
            ids: IdAllocator::new(MAX_THREADS),
            total_quantums: 1,
            mutex: Mutex::new(),
            launcher,
        }
    }

    // --- Queries -----------------------------------------------------------

    pub fn thread(&self, id: ThreadId) -> Option<&ThreadControlBlock> {
        self.threads.get(id).and_then(Option::as_ref)
    }

    fn thread_mut(&mut self, id: ThreadId) -> Option<&mut ThreadControlBlock> {
        self.threads.get_mut(id).and_then(Option::as_mut)
    }

    fn known(&self, id: ThreadId) -> std::result::Result<&ThreadControlBlock, ThreadError> {
        self.thread(id).ok_or(ThreadError::UnknownThread(id))
    }

    #[inline]
    pub fn running_id(&self) -> ThreadId {
        self.running
    }

    #[inline]
    pub fn total_quantums(&self) -> u64 {
        self.total_quantums
    }

    /// Quanta the thread has started in the running state, current one included.
    pub fn quantums_of(&self, id: ThreadId) -> std::result::Result<u64, ThreadError> {
        self.known(id).map(ThreadControlBlock::quantums)
    }

    pub fn live_threads(&self) -> usize {
        self.threads.iter().flatten().count()
    }

    /// Ready thread ids, head (next to run) first.
    pub fn ready_queue(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.ready.iter().copied()
    }

    /// Explicitly blocked thread ids, ascending.
    pub fn blocked_set(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.blocked.iter().copied()
    }

    #[inline]
    pub fn mutex(&self) -> &Mutex {
        &self.mutex
    }

    #[inline]
    pub fn holds_mutex(&self, id: ThreadId) -> bool {
        self.mutex.owner() == Some(id)
    }

    /// Entry point of the running thread (`None` for the main thread).
    pub fn running_entry(&self) -> Option<EntryPoint> {
        self.thread(self.running).and_then(ThreadControlBlock::entry)
    }

    /// Raw context pointers for carrying out `switch`.
    ///
    /// The pointers stay valid until either thread is destroyed.
    pub fn contexts(
        &mut self,
        switch: Switch,
    ) -> Option<(*mut ExecutionContext, *const ExecutionContext)> {
        let from = self.thread_mut(switch.from)?.context_ptr();
        let to = self.thread_mut(switch.to)?.context_ptr();
        Some((from, to as *const ExecutionContext))
    }

    // --- Lifecycle ---------------------------------------------------------

    /// Create a ready thread with the smallest free id, queued at the tail.
    pub fn spawn(&mut self, entry: EntryPoint) -> Result<ThreadId> {
        // Ids are exhausted exactly when MAX_THREADS threads are alive.
        let id = self
            .ids
            .take()
            .ok_or(ThreadError::TooManyThreads { max: MAX_THREADS })?;

        let tcb = match ThreadControlBlock::spawn(id, entry, self.launcher) {
            Ok(tcb) => tcb,
            Err(err) => {
                self.ids.release(id);
                return Err(err.into());
            }
        };

        self.threads[id] = Some(tcb);
        self.ready.push_back(id);
        debug!("spawned thread {id}, {} threads alive", self.live_threads());
        Ok(id)
    }

    /// Destroy a thread that is neither running nor the main thread, purging it
    /// from every queue. A mutex it holds is released on its behalf first.
    pub fn terminate(&mut self, id: ThreadId) -> std::result::Result<Termination, ThreadError> {
        let tcb = self.known(id)?;
        if tcb.is_main() || id == self.running {
            return Ok(Termination::Process);
        }

        if self.holds_mutex(id) {
            debug!("thread {id} terminated while holding the mutex, releasing it");
            self.release_mutex();
        }

        self.ready.retain(|&r| r != id);
        self.blocked.remove(&id);
        self.mutex.remove_waiter(id);
        self.threads[id] = None;
        self.ids.release(id);

        debug!("terminated thread {id}, {} threads alive", self.live_threads());
        Ok(Termination::Thread)
    }

    /// Drop every thread, releasing their stacks. Returns how many stacks
    /// were released. The scheduler is unusable afterwards.
    pub fn release_all(&mut self) -> usize {
        self.ready.clear();
        self.blocked.clear();
        self.mutex = Mutex::new();

        let mut released = 0;
        for slot in self.threads.iter_mut() {
            if let Some(tcb) = slot.take() {
                if tcb.owns_stack() {
                    released += 1;
                }
            }
        }
        released
    }

    // --- Transitions -------------------------------------------------------

    /// Quantum expiry: the running thread goes to the tail of the ready queue
    /// and the head starts a new quantum. Logs nothing, since it runs from
    /// the timer signal handler.
    pub fn preempt(&mut self) -> std::result::Result<Switch, SystemError> {
        let from = self.running;
        if let Some(tcb) = self.thread_mut(from) {
            tcb.set_state(ThreadState::Ready);
        }
        self.ready.push_back(from);
        self.dispatch_next(from)
    }

    /// Block a thread by request.
    ///
    /// - already explicitly blocked: no effect
    /// - ready: leaves the ready queue
    /// - waiting for the mutex: stays a waiter, now blocked for both reasons
    /// - running (blocks itself): a scheduling decision is returned
    pub fn block(&mut self, id: ThreadId) -> Result<Option<Switch>> {
        let state = self.known(id)?.state();
        if id == MAIN_THREAD_ID {
            return Err(ThreadError::BlockMainThread.into());
        }
        if state.is_block_requested() {
            return Ok(None);
        }

        if let Some(tcb) = self.thread_mut(id) {
            tcb.set_state(state.with_reason(BlockReasons::REQUESTED));
        }
        self.blocked.insert(id);
        debug!("blocked thread {id} (was {})", state.label());

        match state {
            ThreadState::Ready => {
                self.ready.retain(|&r| r != id);
                Ok(None)
            }
            ThreadState::Running => Ok(Some(self.dispatch_next(id)?)),
            ThreadState::Blocked(_) => Ok(None),
        }
    }

    /// Lift an explicit block. The thread rejoins the ready queue at the tail
    /// unless it is still waiting for the mutex. Running, ready, and
    /// mutex-only waiters are unaffected.
    pub fn resume(&mut self, id: ThreadId) -> std::result::Result<(), ThreadError> {
        let state = self.known(id)?.state();
        if id == MAIN_THREAD_ID {
            return Err(ThreadError::ResumeMainThread);
        }
        if !state.is_block_requested() {
            return Ok(());
        }

        let next = state.without_reason(BlockReasons::REQUESTED);
        if let Some(tcb) = self.thread_mut(id) {
            tcb.set_state(next);
        }
        self.blocked.remove(&id);
        if next == ThreadState::Ready {
            self.ready.push_back(id);
        }
        debug!("resumed thread {id}, now {}", next.label());
        Ok(())
    }

    /// Lock request by the running thread. On contention the caller becomes
    /// a mutex waiter and the CPU is handed to the head of the ready queue.
    pub fn lock_mutex(&mut self) -> Result<LockOutcome> {
        let caller = self.running;
        match self.mutex.acquire(caller) {
            Acquire::Acquired => {
                debug!("thread {caller} locked the mutex");
                Ok(LockOutcome::Acquired)
            }
            Acquire::AlreadyOwned => Err(ThreadError::MutexAlreadyOwned(caller).into()),
            Acquire::Contended => {
                if let Some(tcb) = self.thread_mut(caller) {
                    tcb.set_state(ThreadState::Running.with_reason(BlockReasons::MUTEX));
                }
                self.mutex.enqueue(caller);
                debug!(
                    "thread {caller} waits for the mutex held by {:?}",
                    self.mutex.owner()
                );
                Ok(LockOutcome::Contended(self.dispatch_next(caller)?))
            }
        }
    }

    /// Unlock request by the running thread, which must be the owner.
    pub fn unlock_mutex(&mut self) -> std::result::Result<(), ThreadError> {
        let caller = self.running;
        if !self.holds_mutex(caller) {
            return Err(ThreadError::MutexNotOwned(caller));
        }
        self.release_mutex();
        Ok(())
    }

    /// Release the mutex and apply the hand-off to the chosen waiter's state.
    fn release_mutex(&mut self) -> Handoff {
        let threads = &self.threads;
        let handoff = self.mutex.release(|id| {
            threads
                .get(id)
                .and_then(Option::as_ref)
                .is_some_and(|t| t.state().is_waiting_only_for_mutex())
        });

        match handoff {
            Handoff::Granted(id) | Handoff::Dequeued(id) => {
                let mut next = None;
                if let Some(tcb) = self.thread_mut(id) {
                    let state = tcb.state().without_reason(BlockReasons::MUTEX);
                    tcb.set_state(state);
                    next = Some(state);
                }
                if next == Some(ThreadState::Ready) {
                    self.ready.push_back(id);
                }
                debug!("mutex released, {handoff:?}");
            }
            Handoff::Unlocked => debug!("mutex released, no waiters"),
        }
        handoff
    }

    /// Start a quantum for the head of the ready queue.
    fn dispatch_next(&mut self, from: ThreadId) -> std::result::Result<Switch, SystemError> {
        while let Some(to) = self.ready.pop_front() {
            if let Some(tcb) = self.thread_mut(to) {
                tcb.start_quantum();
                self.running = to;
                self.total_quantums += 1;
                return Ok(Switch { from, to });
            }
        }
        Err(SystemError::Deadlock)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    extern "C" fn launcher() {}
    fn body() {}

    fn scheduler() -> Scheduler {
        Scheduler::new(launcher)
    }

    fn state(s: &Scheduler, id: ThreadId) -> ThreadState {
        s.thread(id).unwrap().state()
    }

    /// Preempt until `id` is running.
    fn run_until(s: &mut Scheduler, id: ThreadId) {
        for _ in 0..MAX_THREADS {
            if s.running_id() == id {
                return;
            }
            s.preempt().unwrap();
        }
        panic!("thread {id} never scheduled");
    }

    /// Every live thread sits exactly where its state says.
    fn assert_consistent(s: &Scheduler) {
        assert_eq!(state(s, s.running_id()), ThreadState::Running);
        for id in 0..MAX_THREADS {
            let Some(tcb) = s.thread(id) else {
                assert!(!s.ready_queue().any(|r| r == id));
                continue;
            };
            let st = tcb.state();
            let in_ready = s.ready_queue().filter(|&r| r == id).count();
            assert_eq!(in_ready, usize::from(st == ThreadState::Ready), "thread {id}");
            assert_eq!(s.blocked_set().any(|b| b == id), st.is_block_requested());
            assert_eq!(s.mutex().is_waiting(id), st.is_waiting_for_mutex());
            if st == ThreadState::Running {
                assert_eq!(s.running_id(), id);
            }
        }
    }

    #[test]
    fn test_initial_state() {
        let s = scheduler();
        assert_eq!(s.running_id(), 0);
        assert_eq!(s.total_quantums(), 1);
        assert_eq!(s.quantums_of(0), Ok(1));
        assert_eq!(s.live_threads(), 1);
        assert!(s.running_entry().is_none());
        assert_consistent(&s);
    }

    #[test]
    fn test_spawn_assigns_smallest_ids() {
        let mut s = scheduler();
        assert_eq!(s.spawn(body).unwrap(), 1);
        assert_eq!(s.spawn(body).unwrap(), 2);
        assert_eq!(s.ready_queue().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(s.quantums_of(1), Ok(0));
        assert_consistent(&s);
    }

    #[test]
    fn test_spawn_beyond_capacity_fails() {
        let mut s = scheduler();
        for _ in 1..MAX_THREADS {
            s.spawn(body).unwrap();
        }
        assert_eq!(s.live_threads(), MAX_THREADS);
        assert!(matches!(
            s.spawn(body),
            Err(Error::Library(ThreadError::TooManyThreads { max: MAX_THREADS }))
        ));
    }

    #[test]
    fn test_round_robin_order() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();

        let mut order = Vec::new();
        for _ in 0..6 {
            let switch = s.preempt().unwrap();
            assert_eq!(switch.to, s.running_id());
            order.push(switch.to);
        }
        assert_eq!(order, vec![1, 2, 0, 1, 2, 0]);
        assert_eq!(s.total_quantums(), 7);
        assert_eq!(s.quantums_of(0), Ok(3));
        assert_eq!(s.quantums_of(1), Ok(2));
        assert_eq!(s.quantums_of(2), Ok(2));
        assert_consistent(&s);
    }

    #[test]
    fn test_preempt_never_grows_ready_queue() {
        let mut s = scheduler();
        let capacity = s.ready.capacity();
        assert!(capacity >= MAX_THREADS);

        s.preempt().unwrap();
        assert_eq!(s.ready.capacity(), capacity);

        // Every thread alive: the queue is at its fullest during a preemption.
        while s.spawn(body).is_ok() {}
        assert_eq!(s.live_threads(), MAX_THREADS);
        for _ in 0..MAX_THREADS + 1 {
            s.preempt().unwrap();
            assert_eq!(s.ready.capacity(), capacity);
        }
        assert_consistent(&s);
    }

    #[test]
    fn test_lone_thread_is_reselected() {
        let mut s = scheduler();
        let switch = s.preempt().unwrap();
        assert!(switch.is_reselection());
        assert_eq!(s.total_quantums(), 2);
        assert_eq!(s.quantums_of(0), Ok(2));
    }

    #[test]
    fn test_block_main_and_unknown_fail() {
        let mut s = scheduler();
        assert!(matches!(s.block(0), Err(Error::Library(ThreadError::BlockMainThread))));
        assert!(matches!(s.block(9), Err(Error::Library(ThreadError::UnknownThread(9)))));
        assert_eq!(s.resume(0), Err(ThreadError::ResumeMainThread));
        assert_eq!(s.resume(9), Err(ThreadError::UnknownThread(9)));
    }

    #[test]
    fn test_block_ready_thread_and_resume() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();

        assert_eq!(s.block(1).unwrap(), None);
        assert_eq!(state(&s, 1), ThreadState::Blocked(BlockReasons::REQUESTED));
        assert_eq!(s.ready_queue().collect::<Vec<_>>(), vec![2]);
        assert_consistent(&s);

        // Blocking again is a no-op.
        assert_eq!(s.block(1).unwrap(), None);

        s.resume(1).unwrap();
        assert_eq!(state(&s, 1), ThreadState::Ready);
        assert_eq!(s.ready_queue().collect::<Vec<_>>(), vec![2, 1]);
        assert_consistent(&s);
    }

    #[test]
    fn test_resume_ready_or_running_is_noop() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.resume(1).unwrap();
        assert_eq!(s.ready_queue().collect::<Vec<_>>(), vec![1]);

        run_until(&mut s, 1);
        s.resume(1).unwrap();
        assert_eq!(state(&s, 1), ThreadState::Running);
        assert_consistent(&s);
    }

    #[test]
    fn test_self_block_schedules_next() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();
        run_until(&mut s, 1);
        let before = s.total_quantums();

        let switch = s.block(1).unwrap().unwrap();
        assert_eq!(switch, Switch { from: 1, to: 2 });
        assert_eq!(s.running_id(), 2);
        assert_eq!(s.total_quantums(), before + 1);
        assert!(s.blocked_set().any(|b| b == 1));
        assert_consistent(&s);
    }

    #[test]
    fn test_terminate_rules() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();

        assert_eq!(s.terminate(42), Err(ThreadError::UnknownThread(42)));
        assert_eq!(s.terminate(0), Ok(Termination::Process));

        run_until(&mut s, 2);
        assert_eq!(s.terminate(2), Ok(Termination::Process));

        assert_eq!(s.terminate(1), Ok(Termination::Thread));
        assert!(s.thread(1).is_none());
        assert_eq!(s.quantums_of(1), Err(ThreadError::UnknownThread(1)));
        assert!(!s.ready_queue().any(|r| r == 1));
        assert_consistent(&s);

        // The freed id is the smallest, so it is reused first.
        assert_eq!(s.spawn(body).unwrap(), 1);
    }

    #[test]
    fn test_terminate_blocked_thread_purges_it() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.block(1).unwrap();
        assert_eq!(s.terminate(1), Ok(Termination::Thread));
        assert_eq!(s.blocked_set().count(), 0);
        assert_eq!(s.live_threads(), 1);
    }

    #[test]
    fn test_mutex_contention_and_handoff() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();

        run_until(&mut s, 1);
        assert_eq!(s.lock_mutex().unwrap(), LockOutcome::Acquired);
        assert_eq!(s.mutex().owner(), Some(1));

        run_until(&mut s, 2);
        let outcome = s.lock_mutex().unwrap();
        let LockOutcome::Contended(switch) = outcome else {
            panic!("expected contention, got {outcome:?}");
        };
        assert_eq!(switch.from, 2);
        assert_eq!(state(&s, 2), ThreadState::Blocked(BlockReasons::MUTEX));
        assert_consistent(&s);

        run_until(&mut s, 1);
        s.unlock_mutex().unwrap();
        assert_eq!(s.mutex().owner(), Some(2));
        assert_eq!(state(&s, 2), ThreadState::Ready);
        assert_consistent(&s);

        run_until(&mut s, 2);
        assert!(s.holds_mutex(2));
    }

    #[test]
    fn test_mutex_misuse() {
        let mut s = scheduler();
        assert_eq!(s.unlock_mutex(), Err(ThreadError::MutexNotOwned(0)));
        s.lock_mutex().unwrap();
        assert!(matches!(
            s.lock_mutex(),
            Err(Error::Library(ThreadError::MutexAlreadyOwned(0)))
        ));

        s.spawn(body).unwrap();
        run_until(&mut s, 1);
        assert_eq!(s.unlock_mutex(), Err(ThreadError::MutexNotOwned(1)));
    }

    #[test]
    fn test_blocked_both_round_trip() {
        let mut s = scheduler();
        s.spawn(body).unwrap();

        s.lock_mutex().unwrap();
        run_until(&mut s, 1);
        assert!(matches!(s.lock_mutex().unwrap(), LockOutcome::Contended(_)));
        assert_eq!(s.running_id(), 0);

        s.block(1).unwrap();
        assert_eq!(state(&s, 1).label(), "BLOCKED_BOTH");
        assert!(s.mutex().is_waiting(1));
        assert_consistent(&s);

        s.resume(1).unwrap();
        assert_eq!(state(&s, 1), ThreadState::Blocked(BlockReasons::MUTEX));
        assert!(!s.ready_queue().any(|r| r == 1));
        assert_consistent(&s);

        s.unlock_mutex().unwrap();
        assert_eq!(s.mutex().owner(), Some(1));
        assert_eq!(state(&s, 1), ThreadState::Ready);
        assert_consistent(&s);
    }

    #[test]
    fn test_unlock_skips_blocked_both_waiter() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();

        s.lock_mutex().unwrap();
        run_until(&mut s, 1);
        s.lock_mutex().unwrap();
        run_until(&mut s, 2);
        s.lock_mutex().unwrap();
        assert_eq!(s.mutex().waiters().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(s.running_id(), 0);

        s.block(1).unwrap();
        s.unlock_mutex().unwrap();

        assert_eq!(s.mutex().owner(), Some(2));
        assert_eq!(state(&s, 2), ThreadState::Ready);
        assert_eq!(state(&s, 1).label(), "BLOCKED_BOTH");
        assert_consistent(&s);
    }

    #[test]
    fn test_unlock_with_only_blocked_both_waiters() {
        let mut s = scheduler();
        s.spawn(body).unwrap();

        s.lock_mutex().unwrap();
        run_until(&mut s, 1);
        s.lock_mutex().unwrap();
        s.block(1).unwrap();

        s.unlock_mutex().unwrap();
        assert_eq!(s.mutex().owner(), None);
        assert_eq!(state(&s, 1), ThreadState::Blocked(BlockReasons::REQUESTED));
        assert_eq!(s.mutex().waiters().count(), 0);
        assert_consistent(&s);

        s.resume(1).unwrap();
        assert_eq!(state(&s, 1), ThreadState::Ready);
        assert_consistent(&s);
    }

    #[test]
    fn test_terminating_owner_releases_mutex() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();

        run_until(&mut s, 1);
        s.lock_mutex().unwrap();
        run_until(&mut s, 2);
        s.lock_mutex().unwrap();
        run_until(&mut s, 0);

        assert_eq!(s.terminate(1), Ok(Termination::Thread));
        assert_eq!(s.mutex().owner(), Some(2));
        assert_eq!(state(&s, 2), ThreadState::Ready);
        assert_consistent(&s);
    }

    #[test]
    fn test_terminating_waiter_leaves_queue() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.lock_mutex().unwrap();
        run_until(&mut s, 1);
        s.lock_mutex().unwrap();

        assert_eq!(s.terminate(1), Ok(Termination::Thread));
        assert_eq!(s.mutex().waiters().count(), 0);
        assert_eq!(s.mutex().owner(), Some(0));
    }

    #[test]
    fn test_no_runnable_thread_is_deadlock() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        run_until(&mut s, 1);
        s.lock_mutex().unwrap();
        run_until(&mut s, 0);
        // Main waits for thread 1, which then blocks itself.
        s.lock_mutex().unwrap();
        assert_eq!(s.running_id(), 1);
        assert!(matches!(s.block(1), Err(Error::System(SystemError::Deadlock))));
    }

    #[test]
    fn test_release_all_counts_stacks() {
        let mut s = scheduler();
        s.spawn(body).unwrap();
        s.spawn(body).unwrap();
        assert_eq!(s.release_all(), 2);
        assert_eq!(s.live_threads(), 0);
    }
}
