//! System call interface
//!
//! The trap layer saves the caller's registers into its trap frame and calls
//! [`Kernel::handle_syscall`]. The request is decoded into a [`Syscall`],
//! executed, and the result is stored in the caller's saved x0; failures
//! become [`SYSCALL_ERROR`].

pub mod numbers;

use log::{debug, warn};

use crate::arch::aarch64::context::TrapFrame;
use crate::arch::Cpu;
use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::memory::layout::PAGE_SIZE;
use crate::memory::VirtAddr;
use crate::process::CloneEntry;

pub use numbers::SYSCALL_ERROR;

/// Longest string `write` will emit, terminator excluded
pub const MAX_WRITE_LEN: usize = PAGE_SIZE;

/// Bytes copied out of user memory per step of `write`
const WRITE_CHUNK: usize = 128;

/// A decoded system call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Write { buf: VirtAddr },
    Fork,
    Exit,
    GetPid,
    Clone(CloneEntry),
}

impl Syscall {
    /// Decode the request saved in `frame`
    ///
    /// # Errors
    /// `UnknownSyscall` for a number outside the table.
    pub fn decode(frame: &TrapFrame) -> Result<Self> {
        let [a0, a1, a2, ..] = frame.syscall_args();
        match frame.syscall_number() {
            numbers::SYS_WRITE => Ok(Self::Write {
                buf: VirtAddr::new(a0 as usize),
            }),
            numbers::SYS_FORK => Ok(Self::Fork),
            numbers::SYS_EXIT => Ok(Self::Exit),
            numbers::SYS_GETPID => Ok(Self::GetPid),
            numbers::SYS_CLONE => Ok(Self::Clone(CloneEntry {
                pc: a0,
                arg: a1,
                stack: a2,
            })),
            other => Err(KernelError::UnknownSyscall(other)),
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            Self::Write { .. } => numbers::SYS_WRITE,
            Self::Fork => numbers::SYS_FORK,
            Self::Exit => numbers::SYS_EXIT,
            Self::GetPid => numbers::SYS_GETPID,
            Self::Clone(_) => numbers::SYS_CLONE,
        }
    }
}

impl<C: Cpu> Kernel<C> {
    /// Syscall trap hook
    ///
    /// The result goes to the caller's trap frame even if the call switched
    /// to another task.
    pub fn handle_syscall(&mut self) {
        let pid = self.current_pid();
        let result = Syscall::decode(self.current_trap_frame()).and_then(|call| {
            debug!("pid {}: {:?}", pid, call);
            self.dispatch(call)
        });

        let ret = result.unwrap_or_else(|err| {
            warn!("pid {}: syscall failed: {}", pid, err);
            SYSCALL_ERROR
        });
        if let Some(frame) = self.trap_frame_mut(pid) {
            frame.set_return_value(ret);
        }
    }

    /// Execute a decoded syscall for the current task
    pub fn dispatch(&mut self, call: Syscall) -> Result<u64> {
        match call {
            Syscall::Write { buf } => self.sys_write(buf),
            Syscall::Fork => self.fork().map(|pid| pid.as_usize() as u64),
            Syscall::Exit => self.exit_current().map(|()| 0),
            Syscall::GetPid => Ok(self.current_pid().as_usize() as u64),
            Syscall::Clone(entry) => self.clone_process(entry).map(|pid| pid.as_usize() as u64),
        }
    }

    /// Print the NUL-terminated string at `buf`, returning its length
    ///
    /// The string is read through the caller's tables and cut off after
    /// [`MAX_WRITE_LEN`] bytes.
    fn sys_write(&self, buf: VirtAddr) -> Result<u64> {
        let mm = self.current_task().mm();
        let mut chunk = [0u8; WRITE_CHUNK];
        let mut written = 0;

        while written < MAX_WRITE_LEN {
            let at = buf
                .as_usize()
                .checked_add(written)
                .map(VirtAddr::new)
                .ok_or(KernelError::NotMapped { va: buf })?;
            let len = WRITE_CHUNK
                .min(PAGE_SIZE - at.page_offset())
                .min(MAX_WRITE_LEN - written);
            mm.copy_from_user(&self.frames, at, &mut chunk[..len])?;

            let end = chunk[..len].iter().position(|&b| b == 0);
            let bytes = &chunk[..end.unwrap_or(len)];
            crate::debug::write_bytes(bytes);
            written += bytes.len();
            if end.is_some() {
                break;
            }
        }
        Ok(written as u64)
    }
}
