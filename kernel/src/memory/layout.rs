//! Board memory layout
//!
//! Physical memory below [`LOW_MEMORY`] holds the kernel image and the boot
//! stack. Everything between [`LOW_MEMORY`] and the peripheral window at
//! [`HIGH_MEMORY`] is handed out page by page by the frame allocator.
//!
//! The kernel reaches physical memory through a linear map at [`VA_START`];
//! user address spaces live in the low half (TTBR0).

/// log2 of the page size
pub const PAGE_SHIFT: usize = 12;

/// log2 of the number of descriptors in one translation table
pub const TABLE_SHIFT: usize = 9;

/// Size of a page / frame (4KB)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Size of a level 2 block (2MB)
pub const SECTION_SIZE: usize = 1 << (PAGE_SHIFT + TABLE_SHIFT);

/// Descriptors per translation table
pub const PTRS_PER_TABLE: usize = 1 << TABLE_SHIFT;

/// First byte of the paging region
pub const LOW_MEMORY: usize = 2 * SECTION_SIZE;

/// Peripheral base; end of the paging region
pub const HIGH_MEMORY: usize = 0x3F00_0000;

/// Bytes handed out by the frame allocator
pub const PAGING_MEMORY: usize = HIGH_MEMORY - LOW_MEMORY;

/// Frames handed out by the frame allocator
pub const PAGING_PAGES: usize = PAGING_MEMORY / PAGE_SIZE;

/// Base of the kernel linear map
pub const VA_START: usize = 0xFFFF_0000_0000_0000;

/// Exclusive upper bound of user virtual addresses (48-bit TTBR0 range)
pub const USER_VA_LIMIT: usize = 1 << 48;

/// Initial user stack pointer set by `move_to_user_mode`
///
/// The stack page below it is mapped eagerly; program images are loaded
/// from virtual address 0 and must end below the stack page.
pub const USER_STACK_TOP: usize = 0x8000_0000;

static_assertions::const_assert!(PAGING_MEMORY % PAGE_SIZE == 0);
static_assertions::const_assert!(USER_STACK_TOP % PAGE_SIZE == 0);
static_assertions::const_assert!(USER_STACK_TOP < USER_VA_LIMIT);
