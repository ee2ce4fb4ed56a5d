//! Kernel state
//!
//! [`Kernel`] owns every piece of mutable core state: the frame allocator,
//! the task table, the current task, the demand-fault counter and the CPU
//! backend. Operations are methods on it, grouped by subsystem:
//!
//! - `scheduler`: `tick`, `yield_now`, `reschedule`, `schedule_tail`
//! - `process`: `create_process`, `fork`, `clone_process`,
//!   `move_to_user_mode`, `exit_current`
//! - `memory::fault`: `handle_page_fault`
//! - `syscall`: `handle_syscall`, `dispatch`
//!
//! On bare metal a single instance lives in `entry`; host tests build
//! their own over `hosted` memory.

use core::ptr::{addr_of_mut, NonNull};

use log::info;

use crate::arch::aarch64::context::TrapFrame;
use crate::arch::Cpu;
use crate::config::KernelConfig;
use crate::error::{KernelError, Resource, Result};
use crate::memory::frame_allocator::FrameAllocator;
use crate::memory::layout::PAGE_SIZE;
use crate::memory::VirtAddr;
use crate::objects::{Pid, Task, TaskFlags, TaskPage};
use crate::scheduler::preempt::PreemptGuard;
use crate::scheduler::TaskTable;

/// The process and memory core
pub struct Kernel<C: Cpu> {
    pub(crate) config: KernelConfig,
    pub(crate) frames: FrameAllocator,
    pub(crate) tasks: TaskTable,
    /// Page of the running task; only `switch_to` changes it
    pub(crate) current: NonNull<TaskPage>,
    /// Demand faults serviced since boot, all tasks together
    pub(crate) faults_serviced: usize,
    pub(crate) cpu: C,
}

impl<C: Cpu> Kernel<C> {
    /// Bring up the core and create the idle task (pid 0)
    ///
    /// The idle task represents the boot thread: it starts out current,
    /// never exits and keeps the configured priority.
    ///
    /// # Errors
    /// - `InvalidPriority` for a non-positive configured priority
    /// - `ResourceExhausted(Frames)` if the idle task's page cannot be allocated
    pub fn new(config: KernelConfig, mut frames: FrameAllocator, cpu: C) -> Result<Self> {
        config.validate()?;

        let idle_pa = frames
            .alloc()
            .ok_or(KernelError::ResourceExhausted(Resource::Frames))?;
        let idle = frames.frame_ptr(idle_pa).cast::<TaskPage>();
        // SAFETY: freshly allocated, zeroed and owned by nobody else.
        unsafe {
            TaskPage::init(
                idle,
                Task::new(Pid::IDLE, config.init_priority, TaskFlags::KTHREAD),
                TrapFrame::new(),
            );
        }

        let mut tasks = TaskTable::new();
        tasks.insert(idle)?;

        info!(
            "kernel core up: {} of {} frames free, idle priority {}",
            frames.free_frames(),
            frames.total_frames(),
            config.init_priority
        );

        Ok(Self {
            config,
            frames,
            tasks,
            current: idle,
            faults_serviced: 0,
            cpu,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    /// Number of tasks created so far, zombies included
    pub fn nr_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn faults_serviced(&self) -> usize {
        self.faults_serviced
    }

    pub fn current_pid(&self) -> Pid {
        self.current_task().pid()
    }

    pub fn current_task(&self) -> &Task {
        // SAFETY: `current` always points at a live page in the task table.
        unsafe { &(*self.current.as_ptr()).task }
    }

    pub fn current_task_mut(&mut self) -> &mut Task {
        // SAFETY: as above; `&mut self` excludes other kernel references.
        unsafe { &mut (*self.current.as_ptr()).task }
    }

    /// Trap frame of the running task
    pub fn current_trap_frame(&self) -> &TrapFrame {
        // SAFETY: see `current_task`.
        unsafe { &(*self.current.as_ptr()).trap_frame }
    }

    pub fn current_trap_frame_mut(&mut self) -> &mut TrapFrame {
        // SAFETY: see `current_task_mut`.
        unsafe { &mut (*self.current.as_ptr()).trap_frame }
    }

    pub fn task(&self, pid: Pid) -> Option<&Task> {
        // SAFETY: pages in the table are live for the kernel's lifetime.
        self.tasks.get(pid).map(|page| unsafe { &(*page.as_ptr()).task })
    }

    pub fn task_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        // SAFETY: as above; `&mut self` excludes other kernel references.
        self.tasks.get(pid).map(|page| unsafe { &mut (*page.as_ptr()).task })
    }

    pub fn trap_frame(&self, pid: Pid) -> Option<&TrapFrame> {
        // SAFETY: see `task`.
        self.tasks.get(pid).map(|page| unsafe { &(*page.as_ptr()).trap_frame })
    }

    pub fn trap_frame_mut(&mut self, pid: Pid) -> Option<&mut TrapFrame> {
        // SAFETY: see `task_mut`.
        self.tasks.get(pid).map(|page| unsafe { &mut (*page.as_ptr()).trap_frame })
    }

    /// Copy bytes out of a task's user memory
    pub fn read_user(&self, pid: Pid, va: VirtAddr, buf: &mut [u8]) -> Result<()> {
        let task = self.task(pid).ok_or(KernelError::NoSuchTask(pid.as_usize()))?;
        task.mm().copy_from_user(&self.frames, va, buf)
    }

    /// Copy bytes into a task's user memory
    pub fn write_user(&mut self, pid: Pid, va: VirtAddr, data: &[u8]) -> Result<()> {
        let page = self.tasks.get(pid).ok_or(KernelError::NoSuchTask(pid.as_usize()))?;
        // SAFETY: see `task_mut`; the allocator is only read.
        let task = unsafe { &mut (*page.as_ptr()).task };
        task.mm_mut().copy_to_user(&self.frames, va, data)
    }

    /// Disable preemption of the running task until the guard drops
    pub fn preempt_guard(&mut self) -> PreemptGuard {
        // SAFETY: task pages are never freed.
        unsafe { PreemptGuard::new(self.current_task_ptr()) }
    }

    pub(crate) fn current_task_ptr(&self) -> NonNull<Task> {
        // SAFETY: projecting a field of a live, non-null page.
        unsafe { NonNull::new_unchecked(addr_of_mut!((*self.current.as_ptr()).task)) }
    }

    /// Kernel virtual address range of a task's page
    pub fn task_page_range(&self, pid: Pid) -> Option<core::ops::Range<usize>> {
        self.tasks.get(pid).map(|page| {
            let base = page.as_ptr() as usize;
            base..base + PAGE_SIZE
        })
    }
}
