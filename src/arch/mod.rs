//! Architecture abstraction for context switching and the preemption mask.
//!
//! The scheduler never touches machine state directly. Everything
//! target-specific funnels through the [`Arch`] trait: capturing and
//! restoring execution snapshots, seeding the snapshot of a thread that has
//! never run, the preemption-mask flag that guards the scheduler's critical
//! sections, and process termination when the last thread exits.

use portable_atomic::{AtomicBool, Ordering};

/// Outcome of a snapshot capture.
///
/// Capturing is the one non-local point in the scheduler: the same call site
/// is reached twice. The first return happens immediately, with the snapshot
/// freshly saved; the second happens an arbitrary time later, when some
/// other thread restores that snapshot and control lands back at the capture
/// point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    /// The snapshot was just saved; execution is falling through.
    Saved,
    /// A restore of this snapshot brought control back here.
    Resumed,
}

/// Architecture abstraction trait.
///
/// Implementations provide just enough machinery to move one execution
/// stream between logical threads. All context methods are associated
/// functions; implementations are expected to be zero-sized.
pub trait Arch {
    /// Saved execution snapshot: registers, stack pointer, and resume point.
    type Snapshot: Default;

    /// Capture the current execution state into `snapshot`.
    ///
    /// Returns [`Landing::Saved`] on the capturing pass and
    /// [`Landing::Resumed`] when a later [`Arch::restore`] of the same
    /// snapshot lands control back at this call site.
    ///
    /// # Safety
    ///
    /// - `snapshot` must point to a valid, writable `Snapshot`.
    /// - The snapshot may only be restored while the stack frames live at
    ///   capture time are still intact.
    unsafe fn capture(snapshot: *mut Self::Snapshot) -> Landing;

    /// Transfer control into a previously captured or seeded snapshot.
    ///
    /// On a real platform this does not return: execution continues at the
    /// snapshot's capture point (or entry shim). The simulated switcher
    /// returns instead, which is what lets scheduler logic run to completion
    /// in tests without any actual control transfer.
    ///
    /// # Safety
    ///
    /// - `snapshot` must have been filled by [`Arch::capture`] or
    ///   [`Arch::seed`] and its stack must still be live.
    /// - Must be called with the preemption mask off.
    unsafe fn restore(snapshot: *const Self::Snapshot);

    /// Seed a snapshot for a thread that has never run, so that the first
    /// restore enters `entry(arg)` on the stack ending at `stack_top`.
    ///
    /// # Safety
    ///
    /// - `snapshot` must point to a valid, writable `Snapshot`.
    /// - `stack_top` must be the highest address of a live, exclusively
    ///   owned stack block large enough for `entry` to execute.
    unsafe fn seed(
        snapshot: *mut Self::Snapshot,
        entry: extern "C" fn(usize),
        arg: usize,
        stack_top: *mut u8,
    );

    /// Mask preemption, returning the prior mask state.
    fn interrupts_off() -> bool;

    /// Restore a previously returned mask state.
    ///
    /// Every scheduler operation restores the exact state it observed rather
    /// than unconditionally unmasking, so nested masked regions compose.
    fn interrupts_set(prior: bool);

    /// Unmask preemption unconditionally. Used by the thread entry
    /// trampoline, which starts inside the masked switch that scheduled it.
    fn interrupts_on();

    /// Whether preemption is currently unmasked.
    fn interrupts_enabled() -> bool;

    /// End the process. Called when the last live thread exits.
    fn terminate(code: i32) -> !;
}

/// A no-op architecture implementation for testing and fallback purposes.
///
/// Capture always reports [`Landing::Saved`] and restore does nothing, so a
/// "switch" falls straight through to the scheduler's post-switch
/// bookkeeping on the caller's own stack. Thread bodies never execute, but
/// every queue and state transition behaves exactly as it would on real
/// hardware, which makes the whole protocol testable as a state machine.
pub struct NoOpArch;

static NOOP_MASK: AtomicBool = AtomicBool::new(true);

impl Arch for NoOpArch {
    type Snapshot = ();

    unsafe fn capture(_snapshot: *mut Self::Snapshot) -> Landing {
        Landing::Saved
    }

    unsafe fn restore(_snapshot: *const Self::Snapshot) {}

    unsafe fn seed(
        _snapshot: *mut Self::Snapshot,
        _entry: extern "C" fn(usize),
        _arg: usize,
        _stack_top: *mut u8,
    ) {
    }

    fn interrupts_off() -> bool {
        NOOP_MASK.swap(false, Ordering::AcqRel)
    }

    fn interrupts_set(prior: bool) {
        NOOP_MASK.store(prior, Ordering::Release);
    }

    fn interrupts_on() {
        NOOP_MASK.store(true, Ordering::Release);
    }

    fn interrupts_enabled() -> bool {
        NOOP_MASK.load(Ordering::Acquire)
    }

    fn terminate(code: i32) -> ! {
        panic!("process terminated with code {}", code);
    }
}

// Real switcher for x86_64 hosts; placeholder elsewhere so the module tree
// and type names stay identical across targets.
#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(not(target_arch = "x86_64"))]
#[path = "stub.rs"]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::X86_64Arch as DefaultArch;

// Without a real switcher the simulated one is the only usable default.
#[cfg(not(target_arch = "x86_64"))]
pub use NoOpArch as DefaultArch;
