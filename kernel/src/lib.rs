//! Tern kernel core
//!
//! Process and memory core of a small preemptive AArch64 kernel:
//!
//! - `memory`: frame allocator, four-level translation tables, per-task
//!   address spaces and demand paging
//! - `objects`: the task record and the page it lives in
//! - `scheduler`: priority-aging round robin driven by the timer
//! - `process`: kernel threads, fork/clone, entry to user mode, exit
//! - `syscall`: decoding and dispatch of the user syscall table
//!
//! Everything hangs off [`Kernel`]. On bare metal (`target_os = "none"`)
//! the `entry` module exposes the `extern "C"` symbols the boot code and
//! trap trampolines call; elsewhere `hosted` provides stand-ins for the
//! hardware so the core runs under the normal test harness.

#![no_std]

#[cfg(not(target_os = "none"))]
#[macro_use]
extern crate std;

pub mod arch;
pub mod components;
pub mod config;
pub mod debug;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod objects;
pub mod process;
pub mod scheduler;
pub mod syscall;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod entry;
#[cfg(not(target_os = "none"))]
pub mod hosted;

pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use kernel::Kernel;
pub use memory::{PhysAddr, VirtAddr};
pub use objects::{Pid, TaskFlags, TaskState};
pub use process::CloneEntry;
pub use syscall::Syscall;
