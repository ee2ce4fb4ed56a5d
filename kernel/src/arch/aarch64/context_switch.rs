//! Context switching for ARM64
//!
//! `cpu_switch_to` stores the callee-saved registers, frame pointer, stack
//! pointer and return address of the running task into its [`CpuContext`]
//! and loads the same set from the next task. Everything else was already
//! saved by the compiler at the call site or by the trap entry path.
//!
//! A task that has never run resumes in `ret_from_fork`: it finishes the
//! scheduler bookkeeping (`schedule_tail`), calls the kernel thread entry in
//! x19 with the argument in x20 if there is one, and then leaves through
//! `ret_to_user`, which restores the TrapFrame sitting at the stack pointer.

use core::arch::global_asm;
use core::ptr::NonNull;

use super::context::CpuContext;
use super::registers::{self, TTBR0_EL1};
use crate::arch::Cpu;
use crate::memory::PhysAddr;

extern "C" {
    fn cpu_switch_to(prev: *mut CpuContext, next: *const CpuContext);
    fn ret_from_fork();
}

// CpuContext layout (matching context.rs):
// Offset | Field
// -------|-------
// 0x00   | x19, x20
// 0x10   | x21, x22
// 0x20   | x23, x24
// 0x30   | x25, x26
// 0x40   | x27, x28
// 0x50   | fp, sp
// 0x60   | pc

global_asm!(
    "
    .section .text
    .global cpu_switch_to
    .type cpu_switch_to, @function
cpu_switch_to:
    mov x9, sp
    stp x19, x20, [x0, #0x00]
    stp x21, x22, [x0, #0x10]
    stp x23, x24, [x0, #0x20]
    stp x25, x26, [x0, #0x30]
    stp x27, x28, [x0, #0x40]
    stp x29, x9,  [x0, #0x50]
    str x30,      [x0, #0x60]

    ldp x19, x20, [x1, #0x00]
    ldp x21, x22, [x1, #0x10]
    ldp x23, x24, [x1, #0x20]
    ldp x25, x26, [x1, #0x30]
    ldp x27, x28, [x1, #0x40]
    ldp x29, x9,  [x1, #0x50]
    ldr x30,      [x1, #0x60]
    mov sp, x9
    ret

    .global ret_from_fork
    .type ret_from_fork, @function
ret_from_fork:
    bl schedule_tail
    cbz x19, 1f
    mov x0, x20
    blr x19
1:
    b ret_to_user
    "
);

/// Bare-metal [`Cpu`]
#[derive(Debug, Default, Clone, Copy)]
pub struct Aarch64Cpu;

impl Cpu for Aarch64Cpu {
    #[inline(never)]
    unsafe fn switch_context(&mut self, prev: NonNull<CpuContext>, next: NonNull<CpuContext>) {
        cpu_switch_to(prev.as_ptr(), next.as_ptr());
    }

    fn enable_irq(&mut self) {
        registers::local_irq_enable();
    }

    fn disable_irq(&mut self) {
        registers::local_irq_disable();
    }

    unsafe fn set_user_table(&mut self, pgd: PhysAddr) {
        TTBR0_EL1::write(pgd.as_u64());
    }

    fn first_run_entry(&self) -> u64 {
        ret_from_fork as usize as u64
    }
}
