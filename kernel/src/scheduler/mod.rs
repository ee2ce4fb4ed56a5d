//! Scheduler - task selection & context switching
//!
//! Priority-aging round robin over the task table:
//!
//! - Every task has a `counter` (ticks left in its slice) and a fixed
//!   `priority` (slice length).
//! - Selection picks the running task with the largest positive counter,
//!   lowest pid first on ties.
//! - When no running task has a positive counter every task is aged,
//!   `counter = (counter >> 1) + priority`, and the scan restarts. Priorities
//!   are positive, so counters grow until one is selectable.
//!
//! The timer calls [`Kernel::tick`]; tasks give up the CPU with
//! [`Kernel::yield_now`]. A task with a raised preempt count is never
//! switched out by the timer.
//!
//! ## Single core only
//!
//! The preempt count defers rescheduling on this core; it does not exclude
//! other cores.

use core::ptr::NonNull;

use log::trace;

use crate::arch::Cpu;
use crate::kernel::Kernel;
use crate::objects::TaskPage;

pub mod preempt;
mod types;

pub use preempt::PreemptGuard;
pub use types::TaskTable;

impl<C: Cpu> Kernel<C> {
    /// Timer interrupt hook
    ///
    /// Burns one tick of the current slice. Once the slice is used up, and
    /// the task allows preemption, reschedules with IRQs unmasked; IRQs are
    /// masked again before returning to the interrupt path.
    pub fn tick(&mut self) {
        let task = self.current_task_mut();
        if task.consume_tick() > 0 || !task.is_preemptible() {
            return;
        }
        task.set_counter(0);

        self.cpu.enable_irq();
        self.reschedule();
        self.cpu.disable_irq();
    }

    /// Give up the rest of the current slice
    pub fn yield_now(&mut self) {
        self.current_task_mut().set_counter(0);
        self.reschedule();
    }

    /// Select the next task and switch to it
    ///
    /// Returns once the calling task is scheduled again (immediately when it
    /// is selected itself).
    pub fn reschedule(&mut self) {
        let _guard = self.preempt_guard();
        let next = self.pick_next();
        self.switch_to(next);
    }

    /// First code run by a newly created task
    ///
    /// Drops the preempt count every new task starts with.
    pub fn schedule_tail(&mut self) {
        self.current_task_mut().preempt_enable();
    }

    /// Selection loop; always terminates because priorities are positive
    fn pick_next(&mut self) -> NonNull<TaskPage> {
        loop {
            let mut best: Option<(NonNull<TaskPage>, i64)> = None;
            for page in self.tasks.iter() {
                // SAFETY: table pages are live; no mutable reference is held.
                let task = unsafe { &(*page.as_ptr()).task };
                if !task.is_running() {
                    continue;
                }
                if best.map_or(true, |(_, counter)| task.counter() > counter) {
                    best = Some((page, task.counter()));
                }
            }

            match best {
                Some((page, counter)) if counter > 0 => return page,
                Some(_) => {}
                // Unreachable while the idle task runs
                None => return self.current,
            }

            for page in self.tasks.iter() {
                // SAFETY: as above; one task at a time.
                unsafe { (*page.as_ptr()).task.age() };
            }
        }
    }

    /// Make `next` the current task
    ///
    /// Installs `next`'s user table, if it has one, before switching
    /// register contexts.
    fn switch_to(&mut self, next: NonNull<TaskPage>) {
        if next == self.current {
            return;
        }
        let prev = core::mem::replace(&mut self.current, next);

        // SAFETY: distinct live pages; these are the only references to them.
        let (prev_task, next_task) = unsafe { (&mut (*prev.as_ptr()).task, &mut (*next.as_ptr()).task) };
        trace!("switch pid {} -> pid {}", prev_task.pid(), next_task.pid());

        if let Some(pgd) = next_task.mm().pgd() {
            // SAFETY: the hierarchy is maintained by the task's AddressSpace.
            unsafe { self.cpu.set_user_table(pgd) };
        }

        let prev_ctx = NonNull::from(prev_task.cpu_context_mut());
        let next_ctx = NonNull::from(next_task.cpu_context_mut());
        // SAFETY: both contexts live in task pages; the caller holds a preempt guard.
        unsafe { self.cpu.switch_context(prev_ctx, next_ctx) };
    }
}
