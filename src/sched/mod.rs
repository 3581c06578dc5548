//! The cooperative scheduler: thread table, queues, and the switch protocol.
//!
//! One [`Scheduler`] owns everything: a fixed-capacity table of thread
//! control blocks indexed by id, the links column those blocks are chained
//! through, the ready queue, the zombie queue, and the lazily created per-id
//! join queues. The running thread is always the head of the ready queue.
//!
//! Every public operation masks preemption on entry and restores the exact
//! prior mask state on every exit path, so nested masked regions compose.
//! The shared state is protected by that discipline alone; only one logical
//! thread ever executes at a time.
//!
//! Reclamation is deferred: a thread cannot free the stack it is executing
//! on, so exit parks the control block on the zombie queue and the next
//! switch-inducing operation performed by a live thread sweeps it.

use crate::arch::{Arch, DefaultArch, Landing};
use crate::errors::{SchedError, SchedResult};
use crate::mem::{StackPool, StackSizeClass};
use crate::thread::{PendingEntry, Tcb, ThreadId, ThreadState, MAX_THREADS};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use log::{debug, trace};

pub mod queue;

pub use queue::WaitQueue;

/// Where [`Scheduler::yield_to`] should send the execution stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldTarget {
    /// Keep running the calling thread. No context switch occurs.
    Current,
    /// The next ready thread in FIFO order, whichever it is.
    Any,
    /// A specific thread, which must currently be ready.
    Thread(ThreadId),
}

/// How many sleepers [`Scheduler::wakeup`] moves to the ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Exactly the queue's head.
    One,
    /// Drain the entire queue.
    All,
}

// The scheduler the current execution stream belongs to, refreshed before
// every control transfer. A freshly started thread reads it from its entry
// trampoline, which has no other channel back to the scheduler that seeded
// it. Per OS thread on hosted builds so independent schedulers in parallel
// tests cannot observe each other.
#[cfg(feature = "std")]
std::thread_local! {
    static ACTIVE_SCHEDULER: core::cell::Cell<*mut ()> =
        core::cell::Cell::new(core::ptr::null_mut());
}

#[cfg(not(feature = "std"))]
static ACTIVE_SCHEDULER: portable_atomic::AtomicPtr<()> =
    portable_atomic::AtomicPtr::new(core::ptr::null_mut());

fn set_active_scheduler(scheduler: *mut ()) {
    #[cfg(feature = "std")]
    ACTIVE_SCHEDULER.with(|slot| slot.set(scheduler));
    #[cfg(not(feature = "std"))]
    ACTIVE_SCHEDULER.store(scheduler, portable_atomic::Ordering::Release);
}

fn active_scheduler() -> *mut () {
    #[cfg(feature = "std")]
    return ACTIVE_SCHEDULER.with(|slot| slot.get());
    #[cfg(not(feature = "std"))]
    ACTIVE_SCHEDULER.load(portable_atomic::Ordering::Acquire)
}

struct Core<A: Arch> {
    slots: Box<[Tcb<A::Snapshot>]>,
    links: Box<[Option<usize>]>,
    ready: WaitQueue,
    zombies: WaitQueue,
    join_waiters: Box<[Option<WaitQueue>]>,
    stacks: StackPool,
}

impl<A: Arch> Core<A> {
    fn current_index(&self) -> usize {
        self.ready
            .head_index()
            .expect("ready queue is never empty while a thread is running")
    }

    fn lowest_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.live)
    }

    /// Move sleepers from `queue` to the ready tail. A woken thread becomes
    /// READY unless a kill already tombstoned it EXITED; the tombstone must
    /// survive the move so the next scheduling pass tears the thread down
    /// instead of resuming it.
    fn wake(&mut self, queue: &WaitQueue, wake: Wake) -> usize {
        let mut moved = 0;
        while let Some(index) = queue.pop_front(&mut self.links) {
            if self.slots[index].state != ThreadState::Exited {
                self.slots[index].state = ThreadState::Ready;
            }
            self.ready.push_back(&mut self.links, index);
            moved += 1;
            if matches!(wake, Wake::One) {
                break;
            }
        }
        moved
    }

    /// Sweep the zombie queue. Safe at the top of any switch-inducing
    /// operation: the caller is live, so it is not executing on any stack
    /// parked here.
    fn reap_exited(&mut self) {
        let mut reclaimed = 0;
        while let Some(index) = self.zombies.pop_front(&mut self.links) {
            self.release_slot(index);
            reclaimed += 1;
        }
        if reclaimed > 0 {
            trace!("reclaimed {} exited thread(s)", reclaimed);
        }
    }

    /// Tear down one slot: drop a never-run entry closure, return the stack
    /// to the pool, and free the id for reuse.
    fn release_slot(&mut self, index: usize) {
        let entry = self.slots[index].entry.take();
        let stack = self.slots[index].stack.take();
        if let Some(entry) = entry {
            unsafe { (entry.drop_fn)(entry.ptr) };
        }
        if let Some(stack) = stack {
            self.stacks.deallocate(stack);
        }
        self.slots[index].state = ThreadState::Exited;
        self.slots[index].live = false;
        self.join_waiters[index] = None;
    }

    /// Release every occupied slot except `current`. Runs when the last
    /// ready thread exits; sleepers still parked on user-owned wait queues
    /// are reclaimed here too.
    fn release_all_slots(&mut self, current: usize) {
        for index in 0..self.slots.len() {
            if index != current && self.slots[index].live {
                self.release_slot(index);
            }
        }
    }
}

/// The cooperative scheduler.
///
/// `Scheduler::new` registers the calling thread as id 0, the running
/// thread. All other threads are started with [`Scheduler::spawn`] and run
/// only when the execution stream is explicitly handed to them.
///
/// The type is deliberately not `Sync`: there is exactly one execution
/// stream, and all interior mutation happens under the preemption mask.
pub struct Scheduler<A: Arch = DefaultArch> {
    core: UnsafeCell<Core<A>>,
}

/// Hands the saving thread's snapshot to `capture` and, on the saving pass,
/// restores the target. When the saved snapshot is later restored, control
/// lands back inside `capture` and this function simply returns, which is
/// how a rescheduled thread falls into its caller's post-switch
/// bookkeeping. Kept `inline(never)` so nothing of the caller's state is
/// live inside the frame that is re-entered.
#[inline(never)]
fn capture_and_restore<A: Arch>(from: *mut A::Snapshot, to: *const A::Snapshot) {
    unsafe {
        if let Landing::Saved = A::capture(from) {
            A::restore(to);
        }
    }
}

unsafe fn drop_boxed<F>(ptr: *mut ()) {
    drop(unsafe { Box::from_raw(ptr as *mut F) });
}

/// First frame of every spawned thread. Entered from a seeded snapshot,
/// still inside the masked switch that scheduled it: takes ownership of the
/// entry closure, realizes a pending kill if one landed before the first
/// run, unmasks, runs the closure, and exits on its behalf when it returns.
extern "C" fn thread_trampoline<A, F>(entry: usize)
where
    A: Arch,
    F: FnOnce(&Scheduler<A>) + 'static,
{
    let sched = unsafe { &*(active_scheduler() as *const Scheduler<A>) };
    let entry = unsafe { Box::from_raw(entry as *mut F) };

    let doomed = {
        let core = unsafe { &mut *sched.core.get() };
        let index = core.current_index();
        core.slots[index].entry = None;
        if core.slots[index].state == ThreadState::Exited {
            true
        } else {
            core.slots[index].state = ThreadState::Running;
            false
        }
    };
    if doomed {
        drop(entry);
        sched.exit();
        unreachable!("exited thread was rescheduled");
    }

    A::interrupts_on();
    entry(sched);
    sched.exit();
    unreachable!("exited thread was rescheduled");
}

impl<A: Arch> Scheduler<A> {
    /// Create a scheduler and register the calling thread as id 0.
    ///
    /// The caller keeps running on its own stack; it is RUNNING and the
    /// head of the ready queue from the start.
    pub fn new() -> Self {
        let mut slots: Vec<Tcb<A::Snapshot>> = (0..MAX_THREADS).map(|_| Tcb::vacant()).collect();
        slots[0].live = true;
        slots[0].state = ThreadState::Running;

        let mut core = Core::<A> {
            slots: slots.into_boxed_slice(),
            links: alloc::vec![None; MAX_THREADS].into_boxed_slice(),
            ready: WaitQueue::new(),
            zombies: WaitQueue::new(),
            join_waiters: (0..MAX_THREADS).map(|_| None).collect::<Vec<_>>().into_boxed_slice(),
            stacks: StackPool::new(),
        };
        core.ready.push_back(&mut core.links, 0);

        Self {
            core: UnsafeCell::new(core),
        }
    }

    /// Id of the calling thread.
    pub fn current(&self) -> ThreadId {
        let prior = A::interrupts_off();
        let core = unsafe { &mut *self.core.get() };
        let index = core.current_index();
        A::interrupts_set(prior);
        ThreadId::new(index)
    }

    /// State of `id`, or `None` if the id is not currently allocated.
    pub fn state_of(&self, id: ThreadId) -> Option<ThreadState> {
        let prior = A::interrupts_off();
        let core = unsafe { &mut *self.core.get() };
        let state = core
            .slots
            .get(id.index())
            .filter(|slot| slot.live)
            .map(|slot| slot.state);
        A::interrupts_set(prior);
        state
    }

    /// Number of threads in the ready queue, the running caller included.
    pub fn ready_count(&self) -> usize {
        let prior = A::interrupts_off();
        let count = unsafe { &*self.core.get() }.ready.len();
        A::interrupts_set(prior);
        count
    }

    /// Start a new thread with a default-sized stack.
    ///
    /// The closure runs when the execution stream first reaches the thread;
    /// it receives this scheduler and may capture any `'static` state.
    /// Returning from the closure is equivalent to calling
    /// [`Scheduler::exit`].
    pub fn spawn<F>(&self, entry: F) -> SchedResult<ThreadId>
    where
        F: FnOnce(&Scheduler<A>) + 'static,
    {
        self.spawn_with_stack(StackSizeClass::Medium, entry)
    }

    /// Start a new thread on a stack of the given size class.
    ///
    /// Allocates the lowest unused id. Fails with
    /// [`SchedError::TooManyThreads`] when the id space is exhausted and
    /// [`SchedError::OutOfMemory`] when stack allocation fails; the id is
    /// not consumed on either path.
    pub fn spawn_with_stack<F>(&self, class: StackSizeClass, entry: F) -> SchedResult<ThreadId>
    where
        F: FnOnce(&Scheduler<A>) + 'static,
    {
        let prior = A::interrupts_off();
        let core = unsafe { &mut *self.core.get() };

        let Some(index) = core.lowest_free_slot() else {
            A::interrupts_set(prior);
            return Err(SchedError::TooManyThreads);
        };
        let Some(stack) = core.stacks.allocate(class) else {
            A::interrupts_set(prior);
            return Err(SchedError::OutOfMemory);
        };

        let entry_ptr = Box::into_raw(Box::new(entry));
        {
            let slot = &mut core.slots[index];
            slot.live = true;
            slot.state = ThreadState::Ready;
            slot.entry = Some(PendingEntry {
                ptr: entry_ptr as *mut (),
                drop_fn: drop_boxed::<F>,
            });
            unsafe {
                A::seed(
                    &mut slot.snapshot,
                    thread_trampoline::<A, F>,
                    entry_ptr as usize,
                    stack.base(),
                )
            };
            slot.stack = Some(stack);
        }
        core.ready.push_back(&mut core.links, index);

        debug!("spawned thread {}", index);
        A::interrupts_set(prior);
        Ok(ThreadId::new(index))
    }

    /// Yield the execution stream to the next ready thread.
    ///
    /// Shorthand for `yield_to(YieldTarget::Any)`.
    pub fn yield_now(&self) -> SchedResult<ThreadId> {
        self.yield_to(YieldTarget::Any)
    }

    /// Hand the execution stream to `target`.
    ///
    /// Returns the id of the thread that was switched to (or the caller's
    /// own id for [`YieldTarget::Current`]). The call returns again, much
    /// later, when some other thread hands the stream back to the caller.
    ///
    /// Fails with [`SchedError::NoReadyThread`] if `Any` finds no other
    /// ready thread, and [`SchedError::InvalidThread`] if a specific target
    /// is not in the ready queue.
    pub fn yield_to(&self, target: YieldTarget) -> SchedResult<ThreadId> {
        let prior = A::interrupts_off();
        let core_ptr = self.core.get();
        set_active_scheduler(self as *const Self as *mut ());

        let core = unsafe { &mut *core_ptr };
        core.reap_exited();

        let current = core.current_index();
        let want = match target {
            YieldTarget::Current => {
                A::interrupts_set(prior);
                return Ok(ThreadId::new(current));
            }
            YieldTarget::Thread(id) if id.index() == current => {
                A::interrupts_set(prior);
                return Ok(id);
            }
            YieldTarget::Any => {
                if core.ready.len() == 1 {
                    A::interrupts_set(prior);
                    return Err(SchedError::NoReadyThread);
                }
                let next = core
                    .ready
                    .second(&core.links)
                    .expect("ready queue with len > 1 has a second element");
                core.ready.rotate(&mut core.links);
                next
            }
            YieldTarget::Thread(id) => {
                let index = id.index();
                let found = if index < MAX_THREADS {
                    core.ready.find_prev(&core.links, index)
                } else {
                    None
                };
                let Some(prev) = found else {
                    A::interrupts_set(prior);
                    return Err(SchedError::InvalidThread);
                };
                core.ready.rotate(&mut core.links);
                if let Some(prev) = prev {
                    core.ready.move_to_front(&mut core.links, index, prev);
                }
                index
            }
        };

        // Switch protocol: the outgoing thread goes back to READY unless a
        // kill already tombstoned it, its snapshot is captured, and the
        // target's snapshot is restored. Control comes back through the
        // captured snapshot when this thread is next scheduled.
        if core.slots[current].state != ThreadState::Exited {
            core.slots[current].state = ThreadState::Ready;
        }
        let from = &mut core.slots[current].snapshot as *mut A::Snapshot;
        let to = &core.slots[want].snapshot as *const A::Snapshot;
        capture_and_restore::<A>(from, to);

        // Post-switch bookkeeping, possibly on a much later pass: if a kill
        // landed on this thread while it was queued, it tears itself down
        // instead of resuming user code.
        let core = unsafe { &mut *core_ptr };
        let head = core.current_index();
        if core.slots[head].state == ThreadState::Exited {
            self.exit();
        } else {
            core.slots[head].state = ThreadState::Running;
        }

        A::interrupts_set(prior);
        Ok(ThreadId::new(want))
    }

    /// Block the calling thread on `queue` and switch to the next ready
    /// thread.
    ///
    /// Returns the id of the thread that received the stream. Fails with
    /// [`SchedError::NoReadyThread`] if the caller is the only ready
    /// thread, in which case nothing is moved and the caller keeps running.
    ///
    /// `queue` must belong to this scheduler's universe; queues are plain
    /// holding areas and every scheduler interprets the indices against its
    /// own table.
    pub fn sleep(&self, queue: &WaitQueue) -> SchedResult<ThreadId> {
        let prior = A::interrupts_off();
        let core_ptr = self.core.get();
        set_active_scheduler(self as *const Self as *mut ());

        let core = unsafe { &mut *core_ptr };
        core.reap_exited();

        if core.ready.len() <= 1 {
            A::interrupts_set(prior);
            return Err(SchedError::NoReadyThread);
        }

        let current = core
            .ready
            .pop_front(&mut core.links)
            .expect("ready queue is never empty while a thread is running");
        queue.push_back(&mut core.links, current);
        core.slots[current].state = ThreadState::Sleeping;

        let next = core.current_index();
        let from = &mut core.slots[current].snapshot as *mut A::Snapshot;
        let to = &core.slots[next].snapshot as *const A::Snapshot;
        capture_and_restore::<A>(from, to);

        let core = unsafe { &mut *core_ptr };
        let head = core.current_index();
        if core.slots[head].state == ThreadState::Exited {
            self.exit();
        } else {
            core.slots[head].state = ThreadState::Running;
        }

        A::interrupts_set(prior);
        Ok(ThreadId::new(next))
    }

    /// Move sleepers from `queue` to the tail of the ready queue.
    ///
    /// Returns the number of threads moved; 0 if the queue is empty. Woken
    /// threads become READY except those already tombstoned EXITED by a
    /// kill, which keep the tombstone and are torn down when next scheduled.
    pub fn wakeup(&self, queue: &WaitQueue, wake: Wake) -> usize {
        let prior = A::interrupts_off();
        let core = unsafe { &mut *self.core.get() };
        let moved = core.wake(queue, wake);
        if moved > 0 {
            trace!("woke {} thread(s)", moved);
        }
        A::interrupts_set(prior);
        moved
    }

    /// Block until thread `id` exits, then return `id`.
    ///
    /// Fails with [`SchedError::InvalidThread`] for the caller's own id or
    /// an id with no live, unexited thread, and with
    /// [`SchedError::NoReadyThread`] if blocking would leave nothing
    /// runnable.
    pub fn join(&self, id: ThreadId) -> SchedResult<ThreadId> {
        let prior = A::interrupts_off();
        let index = id.index();

        let queue = {
            let core = unsafe { &mut *self.core.get() };
            let current = core.current_index();
            if index >= MAX_THREADS
                || index == current
                || !core.slots[index].live
                || core.slots[index].state == ThreadState::Exited
            {
                A::interrupts_set(prior);
                return Err(SchedError::InvalidThread);
            }
            core.join_waiters[index].get_or_insert_with(WaitQueue::new) as *const WaitQueue
        };

        // The queue lives until the target exits, and the exit path moves
        // every joiner out before destroying it, so the reference cannot
        // outlive the queue.
        let slept = self.sleep(unsafe { &*queue });
        A::interrupts_set(prior);
        slept.map(|_| id)
    }

    /// Mark thread `id` for teardown.
    ///
    /// The target's state becomes EXITED in place; its queue membership is
    /// untouched. Actual teardown happens the next time the scheduler would
    /// otherwise run or re-enqueue it. Fails with
    /// [`SchedError::InvalidThread`] for an out-of-range id, the caller's
    /// own id, or an id with no live, unexited thread.
    pub fn kill(&self, id: ThreadId) -> SchedResult<ThreadId> {
        let prior = A::interrupts_off();
        let core = unsafe { &mut *self.core.get() };
        let index = id.index();
        let current = core.current_index();

        if index >= MAX_THREADS
            || index == current
            || !core.slots[index].live
            || core.slots[index].state == ThreadState::Exited
        {
            A::interrupts_set(prior);
            return Err(SchedError::InvalidThread);
        }

        core.slots[index].state = ThreadState::Exited;
        debug!("thread {} marked for teardown", index);
        A::interrupts_set(prior);
        Ok(id)
    }

    /// Terminate the calling thread.
    ///
    /// Wakes everything blocked in [`Scheduler::join`] on this id, destroys
    /// the join queue, and hands the stream to the next ready thread. The
    /// control block is parked on the zombie queue (this thread is still
    /// executing on its own stack) and reclaimed by a later switch. If no
    /// ready thread remains, every outstanding slot is torn down and the
    /// process ends.
    ///
    /// On a real platform this call does not return. The simulated switcher
    /// returns from it, which is what allows exit paths to be unit tested.
    pub fn exit(&self) {
        let prior = A::interrupts_off();
        let core_ptr = self.core.get();
        set_active_scheduler(self as *const Self as *mut ());

        let core = unsafe { &mut *core_ptr };
        let current = core.current_index();
        core.slots[current].state = ThreadState::Exited;

        if let Some(joiners) = core.join_waiters[current].take() {
            core.wake(&joiners, Wake::All);
        }

        let exited = core
            .ready
            .pop_front(&mut core.links)
            .expect("ready queue is never empty while a thread is running");
        debug!("thread {} exited", exited);

        if core.ready.is_empty() {
            // Last thread: nothing can ever run again. The exiting thread's
            // own stack is left for the OS to reclaim with the process.
            core.release_all_slots(exited);
            A::interrupts_set(prior);
            A::terminate(0);
        }

        core.zombies.push_back(&mut core.links, exited);
        let next = core.current_index();
        unsafe { A::restore(&(*core_ptr).slots[next].snapshot) };

        // Reached only on a platform whose restore is simulated.
        A::interrupts_set(prior);
    }
}

impl<A: Arch> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;
    use crate::thread::ThreadState;

    // With the no-op switcher a "switch" never transfers control, but every
    // queue and state transition happens exactly as on real hardware. The
    // test body keeps executing as whichever thread the scheduler believes
    // is current, so one test function can drive the calls of several
    // logical threads in sequence.
    fn sched() -> Scheduler<NoOpArch> {
        Scheduler::new()
    }

    fn running_count(s: &Scheduler<NoOpArch>, upto: usize) -> usize {
        (0..upto)
            .filter(|&i| s.state_of(ThreadId::new(i)) == Some(ThreadState::Running))
            .count()
    }

    #[test]
    fn bootstrap_thread_is_id_zero_and_running() {
        let s = sched();
        assert_eq!(s.current().index(), 0);
        assert_eq!(s.state_of(ThreadId::new(0)), Some(ThreadState::Running));
        assert_eq!(s.ready_count(), 1);
    }

    #[test]
    fn spawn_allocates_lowest_ids_in_order() {
        let s = sched();
        let a = s.spawn(|_| {}).unwrap();
        let b = s.spawn(|_| {}).unwrap();
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 2);
        assert_eq!(s.state_of(a), Some(ThreadState::Ready));
        assert_eq!(s.state_of(b), Some(ThreadState::Ready));
        assert_eq!(s.ready_count(), 3);
        assert_eq!(running_count(&s, 4), 1);
    }

    #[test]
    fn id_space_exhaustion_reports_too_many_threads() {
        let s = sched();
        for _ in 1..MAX_THREADS {
            s.spawn_with_stack(StackSizeClass::Small, |_| {}).unwrap();
        }
        assert_eq!(
            s.spawn_with_stack(StackSizeClass::Small, |_| {}),
            Err(SchedError::TooManyThreads)
        );
    }

    #[test]
    fn yield_current_is_a_noop() {
        let s = sched();
        let _t = s.spawn(|_| {}).unwrap();
        assert_eq!(s.yield_to(YieldTarget::Current).unwrap().index(), 0);
        assert_eq!(s.current().index(), 0);
        assert_eq!(s.state_of(ThreadId::new(0)), Some(ThreadState::Running));
    }

    #[test]
    fn yield_to_own_id_is_a_noop() {
        let s = sched();
        let me = s.current();
        assert_eq!(s.yield_to(YieldTarget::Thread(me)).unwrap(), me);
        assert_eq!(s.state_of(me), Some(ThreadState::Running));
    }

    #[test]
    fn yield_any_alone_reports_no_ready_thread() {
        let s = sched();
        assert_eq!(s.yield_now(), Err(SchedError::NoReadyThread));
        assert_eq!(s.state_of(ThreadId::new(0)), Some(ThreadState::Running));
    }

    #[test]
    fn yield_any_switches_to_next_in_fifo_order() {
        let s = sched();
        let a = s.spawn(|_| {}).unwrap();
        let b = s.spawn(|_| {}).unwrap();

        let got = s.yield_now().unwrap();
        assert_eq!(got, a);
        // The target is now current; the old head rotated to the tail.
        assert_eq!(s.current(), a);
        assert_eq!(s.state_of(a), Some(ThreadState::Running));
        assert_eq!(s.state_of(ThreadId::new(0)), Some(ThreadState::Ready));

        // From a, the next in order is b.
        assert_eq!(s.yield_now().unwrap(), b);
        assert_eq!(s.current(), b);
    }

    #[test]
    fn yield_to_specific_thread_reorders_queue() {
        let s = sched();
        let _a = s.spawn(|_| {}).unwrap();
        let b = s.spawn(|_| {}).unwrap();

        assert_eq!(s.yield_to(YieldTarget::Thread(b)).unwrap(), b);
        assert_eq!(s.current(), b);
        assert_eq!(s.state_of(b), Some(ThreadState::Running));
        assert_eq!(running_count(&s, 4), 1);
    }

    #[test]
    fn yield_to_absent_thread_is_invalid_and_leaves_state_alone() {
        let s = sched();
        let a = s.spawn(|_| {}).unwrap();
        let before = s.ready_count();

        assert_eq!(
            s.yield_to(YieldTarget::Thread(ThreadId::new(9))),
            Err(SchedError::InvalidThread)
        );
        assert_eq!(
            s.yield_to(YieldTarget::Thread(ThreadId::new(MAX_THREADS + 1))),
            Err(SchedError::InvalidThread)
        );
        assert_eq!(s.ready_count(), before);
        assert_eq!(s.current().index(), 0);
        assert_eq!(s.state_of(a), Some(ThreadState::Ready));
    }

    #[test]
    fn sleep_moves_caller_to_wait_queue() {
        let s = sched();
        let t = s.spawn(|_| {}).unwrap();
        let q = WaitQueue::new();

        // Become t, then block it on q; the stream goes back to thread 0.
        s.yield_now().unwrap();
        let back = s.sleep(&q).unwrap();
        assert_eq!(back.index(), 0);
        assert_eq!(q.len(), 1);
        assert_eq!(s.state_of(t), Some(ThreadState::Sleeping));
        assert_eq!(s.ready_count(), 1);
    }

    #[test]
    fn sleep_alone_reports_no_ready_thread_and_moves_nothing() {
        let s = sched();
        let q = WaitQueue::new();
        assert_eq!(s.sleep(&q), Err(SchedError::NoReadyThread));
        assert!(q.is_empty());
        assert_eq!(s.ready_count(), 1);
    }

    #[test]
    fn wakeup_one_and_all() {
        let s = sched();
        let a = s.spawn(|_| {}).unwrap();
        let b = s.spawn(|_| {}).unwrap();
        let q = WaitQueue::new();

        // Park both spawned threads on q.
        s.yield_now().unwrap(); // now a
        s.sleep(&q).unwrap(); // a sleeps, the stream falls to b
        s.yield_to(YieldTarget::Thread(b)).unwrap(); // already current
        s.sleep(&q).unwrap(); // b sleeps, the stream falls to 0
        assert_eq!(q.len(), 2);
        assert_eq!(s.ready_count(), 1);

        assert_eq!(s.wakeup(&q, Wake::One), 1);
        assert_eq!(s.state_of(a), Some(ThreadState::Ready));
        assert_eq!(s.state_of(b), Some(ThreadState::Sleeping));

        assert_eq!(s.wakeup(&q, Wake::All), 1);
        assert_eq!(s.state_of(b), Some(ThreadState::Ready));
        assert!(q.is_empty());
        assert_eq!(s.wakeup(&q, Wake::All), 0);
    }

    #[test]
    fn kill_rejects_self_dead_and_out_of_range() {
        let s = sched();
        assert_eq!(s.kill(s.current()), Err(SchedError::InvalidThread));
        assert_eq!(s.kill(ThreadId::new(5)), Err(SchedError::InvalidThread));
        assert_eq!(
            s.kill(ThreadId::new(MAX_THREADS + 3)),
            Err(SchedError::InvalidThread)
        );

        let t = s.spawn(|_| {}).unwrap();
        assert_eq!(s.kill(t), Ok(t));
        // Already tombstoned; a second kill is invalid.
        assert_eq!(s.kill(t), Err(SchedError::InvalidThread));
    }

    #[test]
    fn kill_tombstones_in_place_without_moving() {
        let s = sched();
        let t = s.spawn(|_| {}).unwrap();
        let q = WaitQueue::new();
        s.yield_now().unwrap(); // become t
        s.sleep(&q).unwrap(); // t sleeps, stream back to 0

        assert_eq!(s.kill(t), Ok(t));
        assert_eq!(s.state_of(t), Some(ThreadState::Exited));
        assert_eq!(q.len(), 1);

        // The tombstone survives the wakeup instead of being overwritten.
        assert_eq!(s.wakeup(&q, Wake::One), 1);
        assert_eq!(s.state_of(t), Some(ThreadState::Exited));
        assert_eq!(s.ready_count(), 2);
    }

    #[test]
    fn killed_thread_is_torn_down_when_scheduled_and_id_recycles() {
        let s = sched();
        let t = s.spawn(|_| {}).unwrap();
        assert_eq!(s.kill(t), Ok(t));

        // Scheduling the tombstoned thread realizes the kill: its exit path
        // runs, it leaves the ready queue, and the stream falls back here.
        assert_eq!(s.yield_now().unwrap(), t);
        assert_eq!(s.ready_count(), 1);
        // Still occupying its id until a later switch sweeps the zombies.
        assert_eq!(s.state_of(t), Some(ThreadState::Exited));

        assert_eq!(s.yield_now(), Err(SchedError::NoReadyThread));
        assert_eq!(s.state_of(t), None);

        // The id is free again and handed out lowest-first.
        let reused = s.spawn(|_| {}).unwrap();
        assert_eq!(reused.index(), t.index());
    }

    #[test]
    fn join_rejects_self_missing_and_exited_targets() {
        let s = sched();
        assert_eq!(s.join(s.current()), Err(SchedError::InvalidThread));
        assert_eq!(s.join(ThreadId::new(7)), Err(SchedError::InvalidThread));
        assert_eq!(
            s.join(ThreadId::new(MAX_THREADS + 9)),
            Err(SchedError::InvalidThread)
        );

        let t = s.spawn(|_| {}).unwrap();
        s.kill(t).unwrap();
        assert_eq!(s.join(t), Err(SchedError::InvalidThread));
    }

    #[test]
    fn join_parks_the_caller_until_target_exits() {
        let s = sched();
        let t = s.spawn(|_| {}).unwrap();

        // Become t, then join thread 0 from it.
        s.yield_now().unwrap();
        assert_eq!(s.join(ThreadId::new(0)), Ok(ThreadId::new(0)));
        assert_eq!(s.state_of(t), Some(ThreadState::Sleeping));

        // Thread 0 exits; the joiner comes back READY and the exiting
        // control block parks on the zombie queue.
        s.exit();
        assert_eq!(s.state_of(t), Some(ThreadState::Ready));
        assert_eq!(s.ready_count(), 1);
    }

    #[test]
    #[should_panic(expected = "process terminated")]
    fn last_thread_exit_terminates_the_process() {
        let s = sched();
        s.exit();
    }
}
