//! Task creation
//!
//! A new task gets one zeroed frame holding its [`TaskPage`]. Its saved
//! context resumes in the CPU's first-run trampoline with the kernel stack
//! pointer at the base of its trap frame:
//!
//! - kernel threads: x19 = entry, x20 = argument, trap frame zeroed
//! - user copies: trap frame copied from the caller with x0 = 0, every
//!   user page copied eagerly (no copy-on-write)
//!
//! New tasks start with a preempt count of 1 which `schedule_tail` drops
//! on their first run.

use log::{info, warn};

use crate::arch::aarch64::context::TrapFrame;
use crate::arch::Cpu;
use crate::error::{KernelError, Resource, Result};
use crate::kernel::Kernel;
use crate::objects::{Pid, Task, TaskFlags, TaskPage};

/// Where a cloned task resumes in user mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneEntry {
    /// User PC
    pub pc: u64,
    /// Passed in x0
    pub arg: u64,
    /// User stack pointer
    pub stack: u64,
}

impl<C: Cpu> Kernel<C> {
    /// Create a task
    ///
    /// With [`TaskFlags::KTHREAD`] the task runs `entry(arg)` in the kernel.
    /// Without it the task is a copy of the caller that returns 0 from the
    /// current syscall; `entry` and `arg` are ignored.
    ///
    /// # Errors
    /// - `ResourceExhausted(TaskSlots)` when the task table is full
    /// - `ResourceExhausted(Frames)` when no frame is left for the task page
    ///   or the copied pages
    /// - `BookkeepingOverflow` when the copy does not fit the child's lists
    ///
    /// On error nothing is installed and every frame taken is given back.
    pub fn create_process(&mut self, flags: TaskFlags, entry: u64, arg: u64) -> Result<Pid> {
        self.copy_process(flags, entry, arg, None)
    }

    /// Duplicate the calling user task
    ///
    /// Returns the child's pid; the child sees 0 in x0.
    pub fn fork(&mut self) -> Result<Pid> {
        self.copy_process(TaskFlags::empty(), 0, 0, None)
    }

    /// Duplicate the calling user task, resuming the child at `entry`
    pub fn clone_process(&mut self, entry: CloneEntry) -> Result<Pid> {
        self.copy_process(TaskFlags::empty(), 0, 0, Some(entry))
    }

    fn copy_process(
        &mut self,
        flags: TaskFlags,
        entry: u64,
        arg: u64,
        resume: Option<CloneEntry>,
    ) -> Result<Pid> {
        let _guard = self.preempt_guard();

        let Some(pid) = self.tasks.next_pid() else {
            warn!("task table full");
            return Err(KernelError::ResourceExhausted(Resource::TaskSlots));
        };
        let page_pa = self
            .frames
            .alloc()
            .ok_or(KernelError::ResourceExhausted(Resource::Frames))?;
        let page = self.frames.frame_ptr(page_pa).cast::<TaskPage>();

        // SAFETY: the current page is live and distinct from the fresh one.
        let parent = unsafe { self.current.as_ref() };
        let kernel_thread = flags.contains(TaskFlags::KTHREAD);

        let mut task = Task::new(pid, parent.task.priority(), flags);
        task.set_preempt_count(1);

        let trap_frame = if kernel_thread {
            TrapFrame::new()
        } else {
            let mut frame = parent.trap_frame;
            frame.set_return_value(0);
            if let Some(resume) = resume {
                frame.elr_el1 = resume.pc;
                frame.sp_el0 = resume.stack;
                frame.set_return_value(resume.arg);
            }
            frame
        };

        // SAFETY: `page` is a zeroed frame nobody else references.
        unsafe { TaskPage::init(page, task, trap_frame) };
        let child = unsafe { &mut *page.as_ptr() };

        if !kernel_thread {
            if let Err(err) = parent.task.mm().duplicate_into(child.task.mm_mut(), &mut self.frames) {
                warn!("pid {}: address space copy failed: {}", parent.task.pid(), err);
                child.task.mm_mut().release(&mut self.frames);
                self.frames.free(page_pa);
                return Err(err);
            }
        }

        let stack_top = child.stack_top() as u64;
        let ctx = child.task.cpu_context_mut();
        ctx.pc = self.cpu.first_run_entry();
        ctx.sp = stack_top;
        if kernel_thread {
            ctx.x19 = entry;
            ctx.x20 = arg;
        }

        self.tasks.insert(page)?;
        info!(
            "pid {} created by pid {} ({}, {} pages)",
            pid,
            parent.task.pid(),
            if kernel_thread { "kernel thread" } else { "user copy" },
            child.task.mm().user_pages().len()
        );
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::hosted::{self, HOST_FIRST_RUN_ENTRY};
    use crate::memory::VirtAddr;
    use crate::objects::TRAP_FRAME_OFFSET;

    #[test]
    fn test_kernel_thread_context() {
        let mut kernel = hosted::kernel(8, KernelConfig::default()).unwrap();
        let pid = kernel.create_process(TaskFlags::KTHREAD, 0xdead_0000, 7).unwrap();
        assert_eq!(pid, Pid::new(1));

        let task = kernel.task(pid).unwrap();
        let ctx = task.cpu_context();
        assert_eq!(ctx.pc, HOST_FIRST_RUN_ENTRY);
        assert_eq!(ctx.x19, 0xdead_0000);
        assert_eq!(ctx.x20, 7);

        let range = kernel.task_page_range(pid).unwrap();
        assert_eq!(ctx.sp as usize, range.start + TRAP_FRAME_OFFSET);
        assert_eq!(task.priority(), 15);
        assert_eq!(task.counter(), 15);
        assert_eq!(task.preempt_count(), 1);
        assert_eq!(*kernel.trap_frame(pid).unwrap(), TrapFrame::new());
    }

    #[test]
    fn test_child_inherits_priority() {
        let mut kernel = hosted::kernel(8, KernelConfig::default().with_init_priority(3)).unwrap();
        let pid = kernel.create_process(TaskFlags::KTHREAD, 0, 0).unwrap();
        assert_eq!(kernel.task(pid).unwrap().priority(), 3);
        assert_eq!(kernel.task(pid).unwrap().counter(), 3);
    }

    #[test]
    fn test_out_of_frames_installs_nothing() {
        let mut kernel = hosted::kernel(1, KernelConfig::default()).unwrap();
        assert_eq!(
            kernel.create_process(TaskFlags::KTHREAD, 0, 0),
            Err(KernelError::ResourceExhausted(Resource::Frames))
        );
        assert_eq!(kernel.nr_tasks(), 1);
        assert!(kernel.current_task().is_preemptible());
    }

    #[test]
    fn test_task_table_exhaustion() {
        let mut kernel = hosted::kernel(80, KernelConfig::default()).unwrap();
        for _ in 1..crate::config::NR_TASKS {
            kernel.create_process(TaskFlags::KTHREAD, 0, 0).unwrap();
        }
        let free = kernel.frames().free_frames();
        assert_eq!(
            kernel.create_process(TaskFlags::KTHREAD, 0, 0),
            Err(KernelError::ResourceExhausted(Resource::TaskSlots))
        );
        assert_eq!(kernel.frames().free_frames(), free);
    }

    #[test]
    fn test_failed_copy_is_rolled_back() {
        // idle page + 6 tables + code and stack pages leaves 5 frames: enough
        // for the child's page and part of its tables, not for a full copy
        let mut kernel = hosted::kernel(14, KernelConfig::default()).unwrap();
        kernel.move_to_user_mode(&[0xAA; 16], VirtAddr::new(0)).unwrap();
        let free = kernel.frames().free_frames();
        assert_eq!(free, 5);

        assert_eq!(kernel.fork(), Err(KernelError::ResourceExhausted(Resource::Frames)));
        assert_eq!(kernel.frames().free_frames(), free);
        assert_eq!(kernel.nr_tasks(), 1);
        assert!(kernel.current_task().is_preemptible());
    }

    #[test]
    fn test_clone_resumes_at_entry() {
        let mut kernel = hosted::kernel(8, KernelConfig::default()).unwrap();
        kernel.current_trap_frame_mut().elr_el1 = 0x400;
        let pid = kernel
            .clone_process(CloneEntry { pc: 0x800, arg: 9, stack: 0x7000 })
            .unwrap();

        let frame = kernel.trap_frame(pid).unwrap();
        assert_eq!(frame.elr_el1, 0x800);
        assert_eq!(frame.sp_el0, 0x7000);
        assert_eq!(frame.return_value(), 9);
        assert!(!kernel.task(pid).unwrap().is_kernel_thread());
    }
}
