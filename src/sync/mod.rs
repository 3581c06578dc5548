//! Synchronization primitives built on the scheduler's sleep/wakeup
//! machinery.
//!
//! Nothing here touches the context layer directly: blocking is
//! [`Scheduler::sleep`](crate::Scheduler::sleep) on a private wait queue,
//! waking is [`Scheduler::wakeup`](crate::Scheduler::wakeup), and atomicity
//! comes from the preemption mask like everywhere else.

pub mod condvar;
pub mod lock;

pub use condvar::Condvar;
pub use lock::Lock;
