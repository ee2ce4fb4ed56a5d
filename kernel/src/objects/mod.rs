//! Kernel objects
//!
//! - [`Task`]: task control block (context, scheduling state, address space)
//! - [`TaskPage`]: the page holding a task, its kernel stack and trap frame

pub mod task;
pub mod task_page;

pub use task::{Pid, Task, TaskFlags, TaskState};
pub use task_page::{TaskPage, KERNEL_STACK_SIZE, TRAP_FRAME_OFFSET};
