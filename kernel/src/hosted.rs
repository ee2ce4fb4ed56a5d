//! Host-side stand-ins for the hardware
//!
//! Lets the whole core run under `cargo test`: frames come from leaked,
//! page-aligned heap memory and [`HostCpu`] records what the assembly would
//! have done. A context switch returns immediately, so after `reschedule`
//! the caller simply continues as the newly selected task.

use core::ptr::NonNull;
use std::boxed::Box;
use std::vec::Vec;

use crate::arch::aarch64::context::CpuContext;
use crate::arch::Cpu;
use crate::config::KernelConfig;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::memory::frame_allocator::{Frame, FrameAllocator};
use crate::memory::layout::LOW_MEMORY;
use crate::memory::PhysAddr;
use crate::objects::Pid;

/// What [`HostCpu::first_run_entry`] hands out instead of `ret_from_fork`
pub const HOST_FIRST_RUN_ENTRY: u64 = 0xF1F0_0000;

/// Frame allocator over `frames` fresh host frames
///
/// The backing memory is leaked; physical addresses start at `LOW_MEMORY`.
pub fn frame_allocator(frames: usize) -> FrameAllocator {
    let window: &'static mut [Frame] = Box::leak(std::vec![Frame::zeroed(); frames.max(1)].into_boxed_slice());
    let base = NonNull::from(&mut window[0]);
    // SAFETY: the leaked slice covers `frames` frames and is never freed.
    unsafe { FrameAllocator::new(PhysAddr::new(LOW_MEMORY), base, frames) }
}

/// Kernel over `frames` host frames and a fresh [`HostCpu`]
pub fn kernel(frames: usize, config: KernelConfig) -> Result<Kernel<HostCpu>> {
    Kernel::new(config, frame_allocator(frames), HostCpu::new())
}

/// Side effect observed by [`HostCpu`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuEvent {
    Switch { from: Pid, to: Pid },
    IrqEnabled,
    IrqDisabled,
    UserTable(PhysAddr),
}

/// Recording [`Cpu`]
#[derive(Debug, Default)]
pub struct HostCpu {
    events: Vec<CpuEvent>,
    user_table: Option<PhysAddr>,
    irq_enabled: bool,
}

impl HostCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[CpuEvent] {
        &self.events
    }

    /// Number of context switches so far
    pub fn switches(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, CpuEvent::Switch { .. }))
            .count()
    }

    /// Pids switched to, in order
    pub fn switched_to(&self) -> Vec<Pid> {
        self.events
            .iter()
            .filter_map(|event| match event {
                CpuEvent::Switch { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    /// Currently installed user table
    pub fn user_table(&self) -> Option<PhysAddr> {
        self.user_table
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Pid of the task owning a saved context
///
/// # Safety
/// `ctx` must point at the context of a live task page.
unsafe fn owner(ctx: NonNull<CpuContext>) -> Pid {
    // The context is the first field of the task record.
    (*ctx.cast::<crate::objects::Task>().as_ptr()).pid()
}

impl Cpu for HostCpu {
    unsafe fn switch_context(&mut self, prev: NonNull<CpuContext>, next: NonNull<CpuContext>) {
        let (from, to) = (owner(prev), owner(next));
        self.events.push(CpuEvent::Switch { from, to });
    }

    fn enable_irq(&mut self) {
        self.irq_enabled = true;
        self.events.push(CpuEvent::IrqEnabled);
    }

    fn disable_irq(&mut self) {
        self.irq_enabled = false;
        self.events.push(CpuEvent::IrqDisabled);
    }

    unsafe fn set_user_table(&mut self, pgd: PhysAddr) {
        self.user_table = Some(pgd);
        self.events.push(CpuEvent::UserTable(pgd));
    }

    fn first_run_entry(&self) -> u64 {
        HOST_FIRST_RUN_ENTRY
    }
}
