//! Memory management subsystem
//!
//! - `layout`: physical window, paging region and user address constants
//! - `address`: type-safe physical and virtual addresses
//! - `bitmap` / `frame_allocator`: one bit per frame of the paging region
//! - `paging`: four-level table walks over allocator-owned frames
//! - `address_space`: per-task tables plus the bookkeeping of owned frames
//! - `fault`: demand paging for translation faults
//!
//! Physical memory is only ever touched through the allocator's linear
//! window; a [`PhysAddr`] is never dereferenced directly.

pub mod address;
pub mod address_space;
pub mod bitmap;
pub mod fault;
pub mod frame_allocator;
pub mod layout;
pub mod paging;

pub use address::{PhysAddr, VirtAddr};
pub use address_space::{AddressSpace, UserPage};
pub use fault::FaultStatus;
pub use frame_allocator::{Frame, FrameAllocator};
