//! Task records
//!
//! A task is one thread of execution: its saved [`CpuContext`], scheduling
//! state and counters, and its [`AddressSpace`]. Tasks are never freed;
//! an exited task stays in the table as a zombie.
//!
//! ## Task Lifecycle
//!
//! ```text
//! Running ──(switch out / switch in)──> Running
//!    │
//!    └──(exit)──> Zombie   (terminal, never scheduled again)
//! ```

use core::fmt;

use bitflags::bitflags;

use crate::arch::aarch64::context::CpuContext;
use crate::error::{KernelError, Result};
use crate::memory::address_space::AddressSpace;

/// Process id: the task's index in the task table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(usize);

impl Pid {
    /// The idle task created at boot
    pub const IDLE: Pid = Pid(0);

    pub const fn new(index: usize) -> Self {
        Pid(index)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TaskState {
    /// Eligible for selection (running or waiting for the CPU)
    Running = 0,
    /// Exited; never selected again
    Zombie = 1,
}

bitflags! {
    /// Task creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u64 {
        /// Kernel thread: runs a kernel function, no user address space yet
        const KTHREAD = 0x2;
    }
}

/// Task control block
#[repr(C)]
pub struct Task {
    /// Saved registers; stays at offset 0 for the switch code
    cpu_context: CpuContext,

    state: TaskState,

    /// Ticks left in the current slice
    counter: i64,

    /// Slice length granted when counters are refilled
    priority: i64,

    /// Non-zero while the task must not be rescheduled
    preempt_count: i64,

    flags: TaskFlags,

    pid: Pid,

    mm: AddressSpace,
}

const _: () = assert!(core::mem::offset_of!(Task, cpu_context) == 0);

impl Task {
    /// New running task with a full slice
    pub const fn new(pid: Pid, priority: i64, flags: TaskFlags) -> Self {
        Self {
            cpu_context: CpuContext::new(),
            state: TaskState::Running,
            counter: priority,
            priority,
            preempt_count: 0,
            flags,
            pid,
            mm: AddressSpace::empty(),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    #[inline]
    pub fn counter(&self) -> i64 {
        self.counter
    }

    #[inline]
    pub fn set_counter(&mut self, counter: i64) {
        self.counter = counter;
    }

    #[inline]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Change the slice length
    ///
    /// # Errors
    /// `InvalidPriority` unless `priority` is positive; aging would never
    /// make a counter selectable otherwise.
    pub fn set_priority(&mut self, priority: i64) -> Result<()> {
        if priority <= 0 {
            return Err(KernelError::InvalidPriority(priority));
        }
        self.priority = priority;
        Ok(())
    }

    #[inline]
    pub fn preempt_count(&self) -> i64 {
        self.preempt_count
    }

    #[inline]
    pub fn is_preemptible(&self) -> bool {
        self.preempt_count == 0
    }

    #[inline]
    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    #[inline]
    pub fn is_kernel_thread(&self) -> bool {
        self.flags.contains(TaskFlags::KTHREAD)
    }

    pub fn mm(&self) -> &AddressSpace {
        &self.mm
    }

    pub fn mm_mut(&mut self) -> &mut AddressSpace {
        &mut self.mm
    }

    pub fn cpu_context(&self) -> &CpuContext {
        &self.cpu_context
    }

    pub fn cpu_context_mut(&mut self) -> &mut CpuContext {
        &mut self.cpu_context
    }

    /// Consume one tick of the slice, returning what is left
    pub fn consume_tick(&mut self) -> i64 {
        self.counter -= 1;
        self.counter
    }

    /// Refill step: halve what is left and add the priority
    pub fn age(&mut self) {
        self.counter = (self.counter >> 1) + self.priority;
    }

    /// Terminal transition
    pub fn exit(&mut self) {
        self.state = TaskState::Zombie;
    }

    pub(crate) fn set_preempt_count(&mut self, count: i64) {
        self.preempt_count = count;
    }

    pub(crate) fn preempt_disable(&mut self) {
        self.preempt_count += 1;
    }

    pub(crate) fn preempt_enable(&mut self) {
        debug_assert!(self.preempt_count > 0, "unbalanced preempt_enable");
        self.preempt_count -= 1;
    }

    pub(crate) fn become_user_process(&mut self) {
        self.flags.remove(TaskFlags::KTHREAD);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("counter", &self.counter)
            .field("priority", &self.priority)
            .field("preempt_count", &self.preempt_count)
            .field("flags", &self.flags)
            .field("pgd", &self.mm.pgd())
            .finish()
    }
}
