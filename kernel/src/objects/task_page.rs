//! Task pages
//!
//! Every task lives in one page-sized frame:
//!
//! ```text
//! +------------------+ <- page base
//! | Task             |
//! +------------------+
//! | kernel stack     |  grows down
//! |        ...       |
//! +------------------+ <- initial kernel sp
//! | TrapFrame        |  user registers, saved/restored by the trap path
//! +------------------+ <- page base + THREAD_SIZE
//! ```
//!
//! The trap frame is a named field at a fixed offset, so the trap code and
//! the kernel agree on its location without pointer arithmetic.

use core::mem::{offset_of, size_of};
use core::ptr::{addr_of_mut, NonNull};

use crate::arch::aarch64::context::TrapFrame;
use crate::config::THREAD_SIZE;
use crate::objects::task::Task;

/// Bytes of kernel stack between the task record and the trap frame
pub const KERNEL_STACK_SIZE: usize = THREAD_SIZE - size_of::<Task>() - size_of::<TrapFrame>();

/// Task control block, kernel stack and trap frame sharing one page
#[repr(C, align(4096))]
pub struct TaskPage {
    pub task: Task,
    stack: [u8; KERNEL_STACK_SIZE],
    pub trap_frame: TrapFrame,
}

/// Offset of the trap frame from the page base (for the trap trampolines)
pub const TRAP_FRAME_OFFSET: usize = offset_of!(TaskPage, trap_frame);

static_assertions::assert_eq_size!(TaskPage, [u8; THREAD_SIZE]);
static_assertions::const_assert_eq!(TRAP_FRAME_OFFSET, THREAD_SIZE - size_of::<TrapFrame>());
// AArch64 requires a 16-byte aligned stack pointer
static_assertions::const_assert_eq!(TRAP_FRAME_OFFSET % 16, 0);

impl TaskPage {
    /// Initialize a task page in place
    ///
    /// The kernel stack bytes are left as found; callers pass a zeroed frame.
    ///
    /// # Safety
    /// `page` must point to a writable, exclusively owned frame.
    pub unsafe fn init(page: NonNull<TaskPage>, task: Task, trap_frame: TrapFrame) {
        let p = page.as_ptr();
        addr_of_mut!((*p).task).write(task);
        addr_of_mut!((*p).trap_frame).write(trap_frame);
    }

    /// Initial kernel stack pointer: the base of the trap frame
    pub fn stack_top(&self) -> usize {
        &self.trap_frame as *const TrapFrame as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosted;
    use crate::objects::task::{Pid, TaskFlags};

    #[test]
    fn test_layout() {
        assert_eq!(core::mem::align_of::<TaskPage>(), THREAD_SIZE);
        assert!(KERNEL_STACK_SIZE >= 2048);
        assert_eq!(offset_of!(TaskPage, task), 0);
    }

    #[test]
    fn test_init_in_frame() {
        let mut frames = hosted::frame_allocator(1);
        let pa = frames.alloc().unwrap();
        let page = frames.frame_ptr(pa).cast::<TaskPage>();

        let mut frame = TrapFrame::new();
        frame.regs[0] = 42;
        unsafe { TaskPage::init(page, Task::new(Pid::new(5), 15, TaskFlags::empty()), frame) };

        let page = unsafe { page.as_ref() };
        assert_eq!(page.task.pid(), Pid::new(5));
        assert_eq!(page.trap_frame.return_value(), 42);
        assert_eq!(page.stack_top() - frames.virt_addr(pa).as_usize(), TRAP_FRAME_OFFSET);
    }
}
