//! Task exit

use log::info;

use crate::arch::Cpu;
use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::objects::Pid;

impl<C: Cpu> Kernel<C> {
    /// Turn the current task into a zombie and switch away for good
    ///
    /// On hardware this does not return: a zombie is never selected again.
    /// Its page and frames are not reclaimed.
    ///
    /// # Errors
    /// `IdleTaskExit` if called by the idle task, which must always stay
    /// runnable.
    pub fn exit_current(&mut self) -> Result<()> {
        let pid = self.current_pid();
        if pid == Pid::IDLE {
            return Err(KernelError::IdleTaskExit);
        }

        {
            let _guard = self.preempt_guard();
            self.current_task_mut().exit();
        }
        info!("pid {} exited", pid);

        self.yield_now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::KernelConfig;
    use crate::error::KernelError;
    use crate::hosted;
    use crate::objects::{Pid, TaskFlags, TaskState};

    #[test]
    fn test_exit_switches_away_for_good() {
        let mut kernel = hosted::kernel(8, KernelConfig::default()).unwrap();
        let pid = kernel.create_process(TaskFlags::KTHREAD, 0, 0).unwrap();
        kernel.yield_now();
        kernel.schedule_tail();
        assert_eq!(kernel.current_pid(), pid);

        kernel.exit_current().unwrap();
        assert_eq!(kernel.current_pid(), Pid::IDLE);
        assert_eq!(kernel.task(pid).unwrap().state(), TaskState::Zombie);
        assert_eq!(kernel.nr_tasks(), 2);
    }

    #[test]
    fn test_idle_cannot_exit() {
        let mut kernel = hosted::kernel(4, KernelConfig::default()).unwrap();
        assert_eq!(kernel.exit_current(), Err(KernelError::IdleTaskExit));
        assert!(kernel.current_task().is_running());
    }
}
