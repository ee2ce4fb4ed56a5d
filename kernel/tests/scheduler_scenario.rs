//! Timer-driven scheduling over many ticks

use std::collections::BTreeMap;

use tern_kernel::hosted::{self, HostCpu};
use tern_kernel::{Kernel, KernelConfig, Pid, TaskFlags};

fn spawn(kernel: &mut Kernel<HostCpu>, priority: i64) -> Pid {
    let pid = kernel.create_process(TaskFlags::KTHREAD, 0x2000, 0).unwrap();
    kernel.task_mut(pid).unwrap().set_priority(priority).unwrap();
    pid
}

/// Tick `ticks` times, counting which task each tick landed on
fn run(kernel: &mut Kernel<HostCpu>, ticks: usize) -> BTreeMap<Pid, usize> {
    let mut seen = BTreeMap::new();
    for _ in 0..ticks {
        *seen.entry(kernel.current_pid()).or_insert(0) += 1;
        kernel.tick();
        // First run of a new task goes through ret_from_fork
        if kernel.current_task().preempt_count() > 0 {
            kernel.schedule_tail();
        }
    }
    seen
}

#[test]
fn test_every_task_makes_progress() {
    let mut kernel = hosted::kernel(16, KernelConfig::default()).unwrap();
    let tasks = [spawn(&mut kernel, 1), spawn(&mut kernel, 5), spawn(&mut kernel, 15)];

    let seen = run(&mut kernel, 2000);
    assert!(seen[&Pid::IDLE] > 0);
    for pid in tasks {
        assert!(seen.get(&pid).copied().unwrap_or(0) > 0, "pid {} starved", pid);
    }
}

#[test]
fn test_slices_follow_priority() {
    let mut kernel = hosted::kernel(16, KernelConfig::default().with_init_priority(10)).unwrap();
    let low = spawn(&mut kernel, 10);
    let high = spawn(&mut kernel, 30);

    let seen = run(&mut kernel, 3000);
    assert!(seen[&high] > seen[&low]);
    assert!(seen[&high] > seen[&Pid::IDLE]);
}

#[test]
fn test_zombies_get_no_ticks() {
    let mut kernel = hosted::kernel(16, KernelConfig::default()).unwrap();
    let live = spawn(&mut kernel, 15);
    let dead = spawn(&mut kernel, 15);
    kernel.task_mut(dead).unwrap().exit();

    let seen = run(&mut kernel, 500);
    assert!(seen.contains_key(&live));
    assert!(!seen.contains_key(&dead));
}

#[test]
fn test_irqs_are_masked_after_every_tick() {
    let mut kernel = hosted::kernel(16, KernelConfig::default()).unwrap();
    spawn(&mut kernel, 3);
    run(&mut kernel, 200);
    assert!(!kernel.cpu().irq_enabled());
    assert!(kernel.cpu().switches() > 0);
}
