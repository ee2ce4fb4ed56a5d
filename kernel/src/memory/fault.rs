//! Demand paging
//!
//! A data or instruction abort whose fault status code is a translation
//! fault (no valid descriptor at some level) is resolved by mapping one
//! zeroed page at the faulting page boundary in the running task's address
//! space. Every other abort is handed back to the trap layer as
//! [`KernelError::InvalidFault`].

use core::fmt;

use log::{debug, warn};

use crate::arch::Cpu;
use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::memory::layout::USER_VA_LIMIT;
use crate::memory::VirtAddr;

/// Fault status code field of ESR_EL1 (DFSC / IFSC)
const FSC_MASK: u64 = 0x3F;

/// Decoded fault status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStatus {
    AddressSize { level: u8 },
    Translation { level: u8 },
    AccessFlag { level: u8 },
    Permission { level: u8 },
    Alignment,
    Other(u8),
}

impl FaultStatus {
    pub fn from_esr(esr: u64) -> Self {
        let fsc = (esr & FSC_MASK) as u8;
        let level = fsc & 0b11;
        match fsc >> 2 {
            0b0000 => Self::AddressSize { level },
            0b0001 => Self::Translation { level },
            0b0010 if level != 0 => Self::AccessFlag { level },
            0b0011 if level != 0 => Self::Permission { level },
            _ if fsc == 0b10_0001 => Self::Alignment,
            _ => Self::Other(fsc),
        }
    }

    /// Missing descriptor, the only kind resolved on demand
    #[inline]
    pub fn is_translation(self) -> bool {
        matches!(self, Self::Translation { .. })
    }
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressSize { level } => write!(f, "address size fault, level {}", level),
            Self::Translation { level } => write!(f, "translation fault, level {}", level),
            Self::AccessFlag { level } => write!(f, "access flag fault, level {}", level),
            Self::Permission { level } => write!(f, "permission fault, level {}", level),
            Self::Alignment => write!(f, "alignment fault"),
            Self::Other(fsc) => write!(f, "fault status {:#04x}", fsc),
        }
    }
}

impl<C: Cpu> Kernel<C> {
    /// Resolve a synchronous abort at `addr` with syndrome `esr`
    ///
    /// # Errors
    /// - `InvalidFault` for anything but a translation fault in the user range
    /// - `FaultLimitReached` once the configured number of faults has been
    ///   serviced
    /// - allocation and bookkeeping errors from mapping the page
    ///
    /// No frame is allocated unless the fault is resolved.
    pub fn handle_page_fault(&mut self, addr: VirtAddr, esr: u64) -> Result<()> {
        let status = FaultStatus::from_esr(esr);
        if !status.is_translation() || addr.as_usize() >= USER_VA_LIMIT {
            warn!("pid {}: {} at {}", self.current_pid(), status, addr);
            return Err(KernelError::InvalidFault { addr, esr });
        }
        if let Some(limit) = self.config.fault_limit {
            if self.faults_serviced >= limit {
                warn!("refusing fault at {}: {} faults serviced", addr, self.faults_serviced);
                return Err(KernelError::FaultLimitReached {
                    serviced: self.faults_serviced,
                });
            }
        }

        let _guard = self.preempt_guard();
        // SAFETY: the current page is live; `self.frames` is a separate field.
        let task = unsafe { &mut self.current.as_mut().task };
        let had_table = task.mm().pgd().is_some();
        let mapped = task.mm_mut().allocate_user_page(&mut self.frames, addr.page_base());

        // A failed walk can still leave a new top-level table behind
        if !had_table {
            if let Some(pgd) = task.mm().pgd() {
                // SAFETY: just built by the task's AddressSpace.
                unsafe { self.cpu.set_user_table(pgd) };
            }
        }

        let page = mapped?;
        self.faults_serviced += 1;
        debug!("pid {}: {} at {} -> {}", task.pid(), status, addr, page);
        Ok(())
    }
}
