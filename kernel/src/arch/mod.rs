//! Architecture-specific code
//!
//! The portable kernel reaches the processor only through the [`Cpu`] trait:
//! switching register contexts, masking IRQs and installing a user
//! translation table. [`aarch64::Aarch64Cpu`] implements it on bare metal;
//! host builds use `crate::hosted::HostCpu`.

pub mod aarch64;

use core::ptr::NonNull;

use crate::memory::PhysAddr;
use aarch64::context::CpuContext;

/// Processor operations used by the scheduler and process code
pub trait Cpu {
    /// Save the running callee-saved state into `prev` and resume `next`
    ///
    /// Returns when some later switch resumes `prev`.
    ///
    /// # Safety
    /// - Both contexts must live in task pages owned by the kernel
    /// - `next` must hold a context saved by a previous switch or prepared
    ///   by process creation
    /// - The caller must hold the preemption guard of the current task
    unsafe fn switch_context(&mut self, prev: NonNull<CpuContext>, next: NonNull<CpuContext>);

    /// Unmask IRQs on this core
    fn enable_irq(&mut self);

    /// Mask IRQs on this core
    fn disable_irq(&mut self);

    /// Install `pgd` as the active user (TTBR0) translation table
    ///
    /// # Safety
    /// `pgd` must be the root of a well-formed table hierarchy.
    unsafe fn set_user_table(&mut self, pgd: PhysAddr);

    /// Resume address for a task that has never run
    fn first_run_entry(&self) -> u64;
}
