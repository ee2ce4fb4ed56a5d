//! Kernel error type
//!
//! Every fallible kernel operation returns [`Result`]. Nothing in the core
//! panics on a recoverable condition; the trap layer decides what to do with
//! an error that reaches it (kill the faulting task, fail the syscall).

use thiserror::Error;

use crate::memory::{PhysAddr, VirtAddr};

/// Kernel pool that ran dry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Physical frames
    Frames,
    /// Task table slots
    TaskSlots,
}

/// Per-address-space bookkeeping list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageList {
    /// (physical, virtual) pairs mapped for the task
    User,
    /// Frames holding the task's translation tables
    Kernel,
}

/// Error types for kernel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("Out of {0:?}")]
    ResourceExhausted(Resource),

    #[error("Unhandled fault at {addr} (esr: {esr:#x})")]
    InvalidFault { addr: VirtAddr, esr: u64 },

    #[error("Demand fault limit reached after {serviced} faults")]
    FaultLimitReached { serviced: usize },

    #[error("{0:?} page list is full")]
    BookkeepingOverflow(PageList),

    #[error("Virtual address {va} already mapped to {existing}")]
    AlreadyMapped { va: VirtAddr, existing: PhysAddr },

    #[error("Address {addr:#x} is not page aligned")]
    Misaligned { addr: usize },

    #[error("Virtual address {va} is not mapped")]
    NotMapped { va: VirtAddr },

    #[error("The idle task cannot exit")]
    IdleTaskExit,

    #[error("Priority must be positive (got {0})")]
    InvalidPriority(i64),

    #[error("No task with pid {0}")]
    NoSuchTask(usize),

    #[error("Unknown syscall number {0}")]
    UnknownSyscall(u64),
}

pub type Result<T> = core::result::Result<T, KernelError>;
