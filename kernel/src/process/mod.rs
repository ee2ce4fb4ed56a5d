//! Process creation and lifecycle
//!
//! - [`Kernel::create_process`]: new kernel thread, or a copy of the caller
//! - [`Kernel::fork`] / [`Kernel::clone_process`]: user-level duplication
//! - [`Kernel::move_to_user_mode`]: turn the current kernel thread into a
//!   user process
//! - [`Kernel::exit_current`]: become a zombie and leave the CPU

mod exit;
mod fork;
mod user_mode;

pub use fork::CloneEntry;
