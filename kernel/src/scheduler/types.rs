//! Scheduler Types
//!
//! The task table: a fixed arena of task pages indexed by pid. Slots are
//! filled in order and never emptied, so a pid is never reused.

use core::ptr::NonNull;

use crate::config::NR_TASKS;
use crate::error::{KernelError, Resource, Result};
use crate::objects::{Pid, TaskPage};

/// Fixed-capacity table of every task ever created
pub struct TaskTable {
    slots: [Option<NonNull<TaskPage>>; NR_TASKS],
    nr_tasks: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; NR_TASKS],
            nr_tasks: 0,
        }
    }

    /// Pid the next insertion will receive
    pub fn next_pid(&self) -> Option<Pid> {
        (self.nr_tasks < NR_TASKS).then(|| Pid::new(self.nr_tasks))
    }

    /// Install a task page in the next free slot
    ///
    /// The page's task must already carry the pid returned by [`next_pid`](Self::next_pid).
    pub fn insert(&mut self, page: NonNull<TaskPage>) -> Result<Pid> {
        let pid = self
            .next_pid()
            .ok_or(KernelError::ResourceExhausted(Resource::TaskSlots))?;
        self.slots[pid.as_usize()] = Some(page);
        self.nr_tasks += 1;
        Ok(pid)
    }

    pub fn get(&self, pid: Pid) -> Option<NonNull<TaskPage>> {
        self.slots.get(pid.as_usize()).copied().flatten()
    }

    /// Task pages in pid order
    pub fn iter(&self) -> impl Iterator<Item = NonNull<TaskPage>> + '_ {
        self.slots[..self.nr_tasks].iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.nr_tasks
    }

    pub fn is_empty(&self) -> bool {
        self.nr_tasks == 0
    }

    pub fn is_full(&self) -> bool {
        self.nr_tasks == NR_TASKS
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
