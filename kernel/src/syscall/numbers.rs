//! System call numbers
//!
//! The number is passed in x8, arguments in x0-x2, the result comes back in
//! x0. Numbers are positional: user programs are built against these values.

/// Write a NUL-terminated string to the console (buf)
pub const SYS_WRITE: u64 = 0;

/// Duplicate the calling task; returns the child's pid, 0 in the child
pub const SYS_FORK: u64 = 1;

/// Terminate the calling task
pub const SYS_EXIT: u64 = 2;

/// Pid of the calling task
pub const SYS_GETPID: u64 = 3;

/// Duplicate the calling task, child resumes at (entry, arg, stack)
pub const SYS_CLONE: u64 = 4;

/// Number of syscalls
pub const NR_SYSCALLS: u64 = 5;

/// Returned in x0 when a syscall fails
pub const SYSCALL_ERROR: u64 = u64::MAX;
