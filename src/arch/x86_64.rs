//! x86_64 (System V AMD64) context switching.
//!
//! A snapshot holds exactly the state the ABI requires a function call to
//! preserve: the callee-saved registers, the stack pointer, and the resume
//! address. Everything caller-saved is dead across the capture call by ABI
//! contract, so capture/restore behave like a register-only setjmp/longjmp
//! pair. Capture returns 0 on the saving pass; a restore of the same
//! snapshot lands at the capture call site with 1 in `rax`.

use super::{Arch, Landing};
use core::arch::global_asm;
use portable_atomic::{AtomicBool, Ordering};

/// Saved execution state for one logical thread.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Snapshot {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    rip: u64,
}

// Offsets below must match the field order of `Snapshot`.
global_asm!(
    r#"
.text

// u64 __coopthr_capture(Snapshot *snap)
// Saves the caller's resume point and callee-saved registers. Returns 0.
// A later __coopthr_restore of the same snapshot returns 1 from here.
.global __coopthr_capture
__coopthr_capture:
    mov rax, [rsp]
    mov [rdi + 0x38], rax
    lea rax, [rsp + 8]
    mov [rdi + 0x00], rax
    mov [rdi + 0x08], rbp
    mov [rdi + 0x10], rbx
    mov [rdi + 0x18], r12
    mov [rdi + 0x20], r13
    mov [rdi + 0x28], r14
    mov [rdi + 0x30], r15
    xor eax, eax
    ret

// void __coopthr_restore(const Snapshot *snap)
// Loads the snapshot and jumps to its resume point. Never returns here.
.global __coopthr_restore
__coopthr_restore:
    mov rsp, [rdi + 0x00]
    mov rbp, [rdi + 0x08]
    mov rbx, [rdi + 0x10]
    mov r12, [rdi + 0x18]
    mov r13, [rdi + 0x20]
    mov r14, [rdi + 0x28]
    mov r15, [rdi + 0x30]
    mov rcx, [rdi + 0x38]
    mov eax, 1
    jmp rcx

// First landing point of a seeded snapshot. The seeded registers carry the
// entry function in r12 and its argument in r13; rsp is the 16-byte-aligned
// stack top, so the call below leaves the stack ABI-aligned at entry.
.global __coopthr_thread_begin
__coopthr_thread_begin:
    mov rdi, r13
    call r12
    ud2
"#
);

extern "C" {
    fn __coopthr_capture(snapshot: *mut Snapshot) -> u64;
    fn __coopthr_restore(snapshot: *const Snapshot) -> !;
    fn __coopthr_thread_begin();
}

static PREEMPTION_UNMASKED: AtomicBool = AtomicBool::new(true);

/// Context switching and mask state for x86_64 hosts.
///
/// The preemption mask is a process-global flag rather than a hardware
/// interrupt state: a hosted cooperative library has no interrupts to mask,
/// but the flag still carries the save/restore discipline the scheduler's
/// critical sections are written against.
pub struct X86_64Arch;

impl Arch for X86_64Arch {
    type Snapshot = Snapshot;

    unsafe fn capture(snapshot: *mut Snapshot) -> Landing {
        match unsafe { __coopthr_capture(snapshot) } {
            0 => Landing::Saved,
            _ => Landing::Resumed,
        }
    }

    unsafe fn restore(snapshot: *const Snapshot) {
        unsafe { __coopthr_restore(snapshot) }
    }

    unsafe fn seed(
        snapshot: *mut Snapshot,
        entry: extern "C" fn(usize),
        arg: usize,
        stack_top: *mut u8,
    ) {
        let snap = unsafe { &mut *snapshot };
        snap.rsp = (stack_top as u64) & !0xF;
        snap.rbp = 0;
        snap.rbx = 0;
        snap.r12 = entry as usize as u64;
        snap.r13 = arg as u64;
        snap.r14 = 0;
        snap.r15 = 0;
        snap.rip = __coopthr_thread_begin as usize as u64;
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
        #[cfg(feature = "std")]
        {
            std::process::exit(code)
        }
        #[cfg(not(feature = "std"))]
        {
            let _ = code;
            loop {
                core::hint::spin_loop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_snapshot_is_aligned() {
        let mut snap = Snapshot::default();
        extern "C" fn entry(_arg: usize) {}

        // A deliberately misaligned stack top must come out 16-byte aligned.
        unsafe { X86_64Arch::seed(&mut snap, entry, 7, 0x1000_000Bu64 as usize as *mut u8) };
        assert_eq!(snap.rsp % 16, 0);
        assert_eq!(snap.r13, 7);
        assert_eq!(snap.r12, entry as usize as u64);
    }
}
