//! Kernel components
//!
//! Interfaces to collaborators that live outside the core. Only the console
//! is needed: a byte sink for `kprint!`, the logger and `sys_write`. The
//! serial driver behind it is provided by the board code.

pub mod console;
