//! Mutual exclusion for logical threads.

use crate::arch::Arch;
use crate::errors::SchedResult;
use crate::sched::{Scheduler, Wake, WaitQueue};
use crate::thread::ThreadId;
use core::cell::Cell;

/// A blocking mutual-exclusion lock.
///
/// Contended acquirers sleep on the lock's wait queue instead of spinning;
/// a release wakes exactly one of them. State lives in [`Cell`]s because
/// several logical threads share one lock by reference while only one ever
/// executes at a time.
///
/// Misuse is a contract violation and panics: releasing a lock that is not
/// held or that another thread owns, and dropping a lock while it is held.
///
/// ```
/// use cooperative_threads::{Lock, Scheduler};
///
/// let sched: Scheduler = Scheduler::new();
/// let lock = Lock::new();
///
/// lock.acquire(&sched).unwrap();
/// assert_eq!(lock.holder(), Some(sched.current()));
/// lock.release(&sched);
/// assert!(!lock.is_held());
/// ```
pub struct Lock {
    held: Cell<bool>,
    owner: Cell<Option<ThreadId>>,
    waiters: WaitQueue,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            held: Cell::new(false),
            owner: Cell::new(None),
            waiters: WaitQueue::new(),
        }
    }

    /// Block until the lock can be taken, then take it.
    ///
    /// Each wakeup re-checks `held` under the same masked section that put
    /// the caller to sleep, so a wakeup that races another acquirer cannot
    /// be lost. Fails with [`crate::SchedError::NoReadyThread`] if blocking
    /// would leave nothing runnable.
    pub fn acquire<A: Arch>(&self, sched: &Scheduler<A>) -> SchedResult<()> {
        let prior = A::interrupts_off();
        while self.held.get() {
            if let Err(e) = sched.sleep(&self.waiters) {
                A::interrupts_set(prior);
                return Err(e);
            }
        }
        self.held.set(true);
        self.owner.set(Some(sched.current()));
        A::interrupts_set(prior);
        Ok(())
    }

    /// Release the lock and wake one waiter.
    ///
    /// # Panics
    ///
    /// If the lock is not held, or the caller is not the owner.
    pub fn release<A: Arch>(&self, sched: &Scheduler<A>) {
        let prior = A::interrupts_off();
        assert!(self.held.get(), "released a lock that is not held");
        assert_eq!(
            self.owner.get(),
            Some(sched.current()),
            "released a lock owned by another thread"
        );
        self.held.set(false);
        self.owner.set(None);
        sched.wakeup(&self.waiters, Wake::One);
        A::interrupts_set(prior);
    }

    /// Whether the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    /// The owning thread while held, `None` otherwise.
    pub fn holder(&self) -> Option<ThreadId> {
        self.owner.get()
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        assert!(!self.held.get(), "destroyed a lock that is still held");
    }
}
