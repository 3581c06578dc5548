//! Placeholder for targets without a real context switcher.
//!
//! Keeps the `arch::x86_64` module path and type names present on every
//! target so downstream code can name them; all context operations panic.
//! Use [`crate::arch::NoOpArch`] (the default on these targets) to exercise
//! the scheduler without real control transfer.

use super::{Arch, Landing};
use portable_atomic::{AtomicBool, Ordering};

/// Saved execution state placeholder.
#[derive(Debug, Default)]
pub struct Snapshot;

static PREEMPTION_UNMASKED: AtomicBool = AtomicBool::new(true);

/// Stand-in for the x86_64 switcher on other architectures.
pub struct X86_64Arch;

impl Arch for X86_64Arch {
    type Snapshot = Snapshot;

    unsafe fn capture(_snapshot: *mut Snapshot) -> Landing {
        unimplemented!("context capture is only implemented for x86_64")
    }

    unsafe fn restore(_snapshot: *const Snapshot) {
        unimplemented!("context restore is only implemented for x86_64")
    }

    unsafe fn seed(
        _snapshot: *mut Snapshot,
        _entry: extern "C" fn(usize),
        _arg: usize,
        _stack_top: *mut u8,
    ) {
        unimplemented!("context seeding is only implemented for x86_64")
    }

    fn interrupts_off() -> bool {
        PREEMPTION_UNMASKED.swap(false, Ordering::AcqRel)
    }

    fn interrupts_set(prior: bool) {
        PREEMPTION_UNMASKED.store(prior, Ordering::Release);
    }

    fn interrupts_on() {
        PREEMPTION_UNMASKED.store(true, Ordering::Release);
    }

    fn interrupts_enabled() -> bool {
        PREEMPTION_UNMASKED.load(Ordering::Acquire)
    }

    fn terminate(code: i32) -> ! {
        panic!("process terminated with code {}", code);
    }
}
