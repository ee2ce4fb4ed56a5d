//! Preemption guard
//!
//! Kernel state (the task table, address space bookkeeping, the frame
//! bitmap) is only mutated with the current task's preempt count raised.
//! A raised count makes the timer tick skip rescheduling; it does not stop
//! the interrupt itself, and it is no lock: only one core may run the
//! kernel.

use core::ptr::NonNull;

use crate::objects::Task;

/// Raises a task's preempt count for its lifetime
///
/// Guards nest. The count drops again on every exit path, early returns and
/// `?` included.
#[must_use = "preemption is re-enabled as soon as the guard is dropped"]
pub struct PreemptGuard {
    task: NonNull<Task>,
}

impl PreemptGuard {
    /// # Safety
    /// `task` must stay valid for the guard's lifetime. Task pages are never
    /// freed, so any task in the table qualifies.
    pub unsafe fn new(task: NonNull<Task>) -> Self {
        (*task.as_ptr()).preempt_disable();
        Self { task }
    }
}

impl Drop for PreemptGuard {
    fn drop(&mut self) {
        // SAFETY: validity is guaranteed by the constructor contract.
        unsafe { (*self.task.as_ptr()).preempt_enable() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Pid, TaskFlags};

    #[test]
    fn test_guard_restores_on_drop() {
        let mut task = Task::new(Pid::new(1), 15, TaskFlags::empty());
        let ptr = NonNull::from(&mut task);
        {
            let _outer = unsafe { PreemptGuard::new(ptr) };
            let _inner = unsafe { PreemptGuard::new(ptr) };
            assert_eq!(unsafe { ptr.as_ref() }.preempt_count(), 2);
        }
        assert!(task.is_preemptible());
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn fallible(task: NonNull<Task>) -> Result<(), ()> {
            let _guard = unsafe { PreemptGuard::new(task) };
            Err::<(), ()>(())?;
            Ok(())
        }

        let mut task = Task::new(Pid::new(1), 15, TaskFlags::empty());
        assert!(fallible(NonNull::from(&mut task)).is_err());
        assert_eq!(task.preempt_count(), 0);
    }
}
