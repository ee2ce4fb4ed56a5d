//! ARM64 (AArch64) architecture-specific code
//!
//! Descriptor formats and register layouts build everywhere; the assembly
//! backed pieces only build for bare-metal AArch64.

pub mod context;
pub mod page_table;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod context_switch;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod registers;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use context_switch::Aarch64Cpu;
