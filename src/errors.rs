//! Error handling for scheduling operations.
//!
//! Every failure here is a legitimate, locally recoverable outcome reported
//! synchronously to the immediate caller; none indicates corruption.
//! Contract violations (releasing a lock the caller does not own, destroying
//! a condition variable that still has waiters) are programmer errors and
//! panic instead of returning a value.

use core::fmt;

/// Result type for scheduling operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Recoverable failure of a scheduling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// The id does not name a thread eligible for the operation: it is out
    /// of range, not allocated, already exited, or the caller itself where
    /// self-targeting is not allowed.
    InvalidThread,
    /// No other ready thread exists, so there is nothing to switch to and
    /// blocking would leave nothing runnable.
    NoReadyThread,
    /// The thread id space is exhausted.
    TooManyThreads,
    /// Control-block or stack allocation failed. The id considered for the
    /// new thread is not consumed on this path.
    OutOfMemory,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::InvalidThread => write!(f, "no such schedulable thread"),
            SchedError::NoReadyThread => write!(f, "no other ready thread"),
            SchedError::TooManyThreads => write!(f, "thread id space exhausted"),
            SchedError::OutOfMemory => write!(f, "out of memory for thread creation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        assert_eq!(
            std::format!("{}", SchedError::NoReadyThread),
            "no other ready thread"
        );
        assert_eq!(
            std::format!("{}", SchedError::TooManyThreads),
            "thread id space exhausted"
        );
    }
}
