//! ARM64 system register access

use core::arch::asm;

/// Unmask IRQs (clear DAIF.I)
#[inline(always)]
pub fn local_irq_enable() {
    unsafe {
        asm!("msr daifclr, #2", options(nomem, nostack));
    }
}

/// Mask IRQs (set DAIF.I)
#[inline(always)]
pub fn local_irq_disable() {
    unsafe {
        asm!("msr daifset, #2", options(nomem, nostack));
    }
}

/// User translation table base register (EL1)
#[allow(non_camel_case_types)]
pub struct TTBR0_EL1;
impl TTBR0_EL1 {
    /// Install a new user table and drop stale translations
    ///
    /// # Safety
    /// `pgd` must be the physical address of a valid L0 table.
    #[inline(always)]
    pub unsafe fn write(pgd: u64) {
        asm!(
            "msr ttbr0_el1, {0}",
            "tlbi vmalle1is",
            "dsb ish",
            "isb",
            in(reg) pgd,
            options(nostack),
        );
    }
}
