//! Bare-metal entry points
//!
//! The boot code, vector table and trap trampolines live outside this
//! crate and call in through these `extern "C"` symbols. `ret_from_fork`
//! calls [`schedule_tail`]; the trampolines call the rest.
//!
//! The kernel instance is a single global. Interrupt handlers reach it
//! while the interrupted code may be inside a kernel operation; the preempt
//! count keeps such handlers from switching tasks at that point, so the
//! state they touch (the current task's counter) is never observed halfway.
//! That is a single-core argument about behaviour: the two `&mut Kernel`
//! references it involves still alias, see `kernel()`.

use core::cell::UnsafeCell;

use log::{error, info};

use crate::arch::aarch64::Aarch64Cpu;
use crate::components::console::Console;
use crate::debug;
use crate::config::KernelConfig;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::memory::frame_allocator::FrameAllocator;
use crate::memory::VirtAddr;
use crate::objects::TaskFlags;

struct KernelCell(UnsafeCell<Kernel<Aarch64Cpu>>);

// SAFETY: single core only. Cross-thread access never happens; re-entry
// from interrupts is covered (not made sound) by `kernel()`'s contract.
unsafe impl Sync for KernelCell {}
unsafe impl Send for KernelCell {}

static KERNEL: spin::Once<KernelCell> = spin::Once::new();

/// # Safety
/// No other reference obtained from this function may be used while the
/// returned one is.
///
/// Interrupt entries break this: a timer tick or abort taken while task
/// context holds a reference creates a second `&mut Kernel` to the same
/// object, which is undefined behaviour in Rust terms whatever the preempt
/// count says. The preempt count only keeps the handler from switching
/// tasks; it makes the aliasing benign on this single core, not sound.
// TODO: hand the interrupt paths a raw `*mut Kernel` and only touch the
// current task's counter through it, so no second `&mut` is formed.
unsafe fn kernel() -> Option<&'static mut Kernel<Aarch64Cpu>> {
    KERNEL.get().map(|cell| &mut *cell.0.get())
}

/// Bring up the process and memory core
///
/// Must run once on the boot stack after the linear map is live and before
/// the timer is enabled. `console` receives kernel output and log records.
/// The boot thread becomes the idle task.
///
/// # Safety
/// The linear map must cover the paging region, which nothing else may use.
pub unsafe fn kernel_init(config: KernelConfig, console: &'static dyn Console) -> Result<()> {
    if KERNEL.is_completed() {
        return Ok(());
    }
    debug::set_console(console);
    // A logger installed by the board code takes precedence
    let _ = debug::init_logger();

    let kernel = Kernel::new(config, FrameAllocator::from_linear_map(), Aarch64Cpu)?;
    KERNEL.call_once(|| KernelCell(UnsafeCell::new(kernel)));
    info!("process core ready");
    Ok(())
}

/// Periodic timer interrupt
#[no_mangle]
pub extern "C" fn timer_tick() {
    // SAFETY: IRQ context; see module docs.
    if let Some(kernel) = unsafe { kernel() } {
        kernel.tick();
    }
}

/// Voluntary reschedule from kernel code
#[no_mangle]
pub extern "C" fn kernel_schedule() {
    // SAFETY: task context with IRQs masked by the caller or preemption
    // tolerated by `yield_now`.
    if let Some(kernel) = unsafe { kernel() } {
        kernel.yield_now();
    }
}

/// First code of every new task, called from `ret_from_fork`
#[no_mangle]
pub extern "C" fn schedule_tail() {
    // SAFETY: runs on the new task's stack right after the switch.
    if let Some(kernel) = unsafe { kernel() } {
        kernel.schedule_tail();
    }
}

/// Synchronous abort from EL0; returns 0 if the access can be retried
#[no_mangle]
pub extern "C" fn do_mem_abort(addr: u64, esr: u64) -> i32 {
    // SAFETY: synchronous exception in the current task's context.
    let Some(kernel) = (unsafe { kernel() }) else {
        return -1;
    };
    match kernel.handle_page_fault(VirtAddr::new(addr as usize), esr) {
        Ok(()) => 0,
        Err(err) => {
            error!("pid {}: {}", kernel.current_pid(), err);
            -1
        }
    }
}

/// `svc #0` from EL0; the result is left in the saved x0
#[no_mangle]
pub extern "C" fn el0_svc_handler() {
    // SAFETY: synchronous exception in the current task's context.
    if let Some(kernel) = unsafe { kernel() } {
        kernel.handle_syscall();
    }
}

/// Create a task; returns its pid or -1
#[no_mangle]
pub extern "C" fn create_process(flags: u64, entry: u64, arg: u64) -> i64 {
    // SAFETY: task context.
    let Some(kernel) = (unsafe { kernel() }) else {
        return -1;
    };
    match kernel.create_process(TaskFlags::from_bits_truncate(flags), entry, arg) {
        Ok(pid) => pid.as_usize() as i64,
        Err(err) => {
            error!("create_process: {}", err);
            -1
        }
    }
}

/// Turn the calling kernel thread into a user process
///
/// Returns 0 once the trap frame is prepared; the thread then leaves
/// through `ret_to_user`.
///
/// # Safety
/// `[start, start + size)` must be readable kernel memory.
#[no_mangle]
pub unsafe extern "C" fn move_to_user_mode(start: u64, size: u64, pc: u64) -> i32 {
    let Some(kernel) = kernel() else {
        return -1;
    };
    let image = core::slice::from_raw_parts(start as *const u8, size as usize);
    match kernel.move_to_user_mode(image, VirtAddr::new(pc as usize)) {
        Ok(()) => 0,
        Err(err) => {
            error!("move_to_user_mode: {}", err);
            -1
        }
    }
}
