//! ARM64 saved register state
//!
//! Two records are kept per task:
//!
//! - [`CpuContext`]: the callee-saved registers, frame pointer, stack pointer
//!   and resume PC stored by `cpu_switch_to`. Only the context switch and
//!   process creation write it.
//! - [`TrapFrame`]: the full user register snapshot saved by the trap entry
//!   trampoline on every exception from EL0 and restored by the exit path.
//!
//! Both layouts are shared with assembly. DO NOT reorder fields.

use core::fmt;

/// SPSR mode field: EL0 using SP_EL0
pub const PSR_MODE_EL0T: u64 = 0x0000_0000;

/// SPSR mode field: EL1 using SP_EL1
pub const PSR_MODE_EL1H: u64 = 0x0000_0005;

/// Registers preserved across `cpu_switch_to`
///
/// On first run `pc` is the fork trampoline, which reads the kernel thread
/// entry from `x19` and its argument from `x20`.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    /// Frame pointer (x29)
    pub fp: u64,
    pub sp: u64,
    /// Resume address (saved x30)
    pub pc: u64,
}

impl CpuContext {
    pub const fn new() -> Self {
        Self {
            x19: 0, x20: 0, x21: 0, x22: 0, x23: 0,
            x24: 0, x25: 0, x26: 0, x27: 0, x28: 0,
            fp: 0,
            sp: 0,
            pc: 0,
        }
    }
}

impl fmt::Debug for CpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuContext")
            .field("x19", &format_args!("{:#x}", self.x19))
            .field("x20", &format_args!("{:#x}", self.x20))
            .field("fp", &format_args!("{:#x}", self.fp))
            .field("sp", &format_args!("{:#x}", self.sp))
            .field("pc", &format_args!("{:#x}", self.pc))
            .finish()
    }
}

/// Byte size of [`CpuContext`] (for assembly)
pub const CPU_CONTEXT_SIZE: usize = core::mem::size_of::<CpuContext>();

const _: () = assert!(CPU_CONTEXT_SIZE == 13 * 8);

/// User register snapshot saved on exception entry
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    /// General purpose registers x0-x30
    pub regs: [u64; 31],
    /// User stack pointer
    pub sp_el0: u64,
    /// Resume address
    pub elr_el1: u64,
    /// Saved processor state
    pub spsr_el1: u64,
}

impl TrapFrame {
    /// All registers zeroed
    pub const fn new() -> Self {
        Self {
            regs: [0; 31],
            sp_el0: 0,
            elr_el1: 0,
            spsr_el1: 0,
        }
    }

    /// Frame that enters EL0 at `pc` with stack pointer `sp`
    pub const fn user(pc: u64, sp: u64) -> Self {
        let mut frame = Self::new();
        frame.elr_el1 = pc;
        frame.sp_el0 = sp;
        frame.spsr_el1 = PSR_MODE_EL0T;
        frame
    }

    /// Syscall number (x8 by convention)
    #[inline]
    pub fn syscall_number(&self) -> u64 {
        self.regs[8]
    }

    /// Syscall arguments (x0-x5)
    #[inline]
    pub fn syscall_args(&self) -> [u64; 6] {
        [self.regs[0], self.regs[1], self.regs[2], self.regs[3], self.regs[4], self.regs[5]]
    }

    /// Syscall return value (x0)
    #[inline]
    pub fn return_value(&self) -> u64 {
        self.regs[0]
    }

    #[inline]
    pub fn set_return_value(&mut self, value: u64) {
        self.regs[0] = value;
    }

    /// Does this frame resume in EL0?
    pub fn returns_to_user(&self) -> bool {
        self.spsr_el1 & 0xF == PSR_MODE_EL0T
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapFrame")
            .field("x0", &format_args!("{:#018x}", self.regs[0]))
            .field("x1", &format_args!("{:#018x}", self.regs[1]))
            .field("x2", &format_args!("{:#018x}", self.regs[2]))
            .field("x8", &format_args!("{:#018x}", self.regs[8]))
            .field("x30_lr", &format_args!("{:#018x}", self.regs[30]))
            .field("sp_el0", &format_args!("{:#018x}", self.sp_el0))
            .field("elr_el1", &format_args!("{:#018x}", self.elr_el1))
            .field("spsr_el1", &format_args!("{:#018x}", self.spsr_el1))
            .finish()
    }
}

/// Byte size of [`TrapFrame`] (for assembly)
pub const TRAP_FRAME_SIZE: usize = core::mem::size_of::<TrapFrame>();

// 31 GPRs + sp_el0 + elr_el1 + spsr_el1
const _: () = assert!(TRAP_FRAME_SIZE == 34 * 8);
const _: () = assert!(core::mem::align_of::<TrapFrame>() == 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_registers() {
        let mut frame = TrapFrame::new();
        frame.regs[8] = 3;
        frame.regs[0] = 0x1000;
        frame.regs[1] = 7;
        assert_eq!(frame.syscall_number(), 3);
        assert_eq!(frame.syscall_args()[..2], [0x1000, 7]);

        frame.set_return_value(u64::MAX);
        assert_eq!(frame.return_value(), u64::MAX);
    }

    #[test]
    fn test_user_frame() {
        let frame = TrapFrame::user(0x40, 0x2000);
        assert_eq!(frame.elr_el1, 0x40);
        assert_eq!(frame.sp_el0, 0x2000);
        assert!(frame.returns_to_user());

        let mut kernel = frame;
        kernel.spsr_el1 = PSR_MODE_EL1H;
        assert!(!kernel.returns_to_user());
    }
}
