//! ARM64 translation tables
//!
//! 4KB granule, 48-bit input addresses, four levels:
//! - L0 (PGD): 512GB per entry
//! - L1 (PUD): 1GB per entry
//! - L2 (PMD): 2MB per entry
//! - L3 (PTE): 4KB per entry
//!
//! Only table descriptors (L0-L2) and page descriptors (L3) are produced;
//! block mappings belong to the boot-time kernel map.

use bitflags::bitflags;

use crate::memory::layout::{PAGE_SHIFT, PTRS_PER_TABLE, TABLE_SHIFT};
use crate::memory::{PhysAddr, VirtAddr};

/// Page table entry type
pub type PageTableEntry = u64;

/// Output address bits [47:12] of a descriptor
pub const DESCRIPTOR_ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

/// MAIR attribute byte for device nGnRnE memory
pub const MT_DEVICE_NGNRNE_ATTR: u64 = 0x00;

/// MAIR attribute byte for normal non-cacheable memory
pub const MT_NORMAL_NC_ATTR: u64 = 0x44;

/// MAIR_EL1 value matching the attribute indices used in [`PageTableFlags`]
pub const MAIR_EL1_VALUE: u64 = MT_DEVICE_NGNRNE_ATTR | (MT_NORMAL_NC_ATTR << 8);

bitflags! {
    /// Descriptor bits (ARMv8-A stage 1, 4KB granule)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageTableFlags: u64 {
        /// Valid entry
        const VALID         = 1 << 0;

        /// Table (L0-L2) or page (L3) descriptor
        const TABLE_OR_PAGE = 1 << 1;

        // Memory attributes (AttrIndx[2:0])
        const ATTR_INDEX_0  = 0 << 2;
        const ATTR_INDEX_1  = 1 << 2;

        // Access permissions (AP[2:1])
        const AP_RW_EL1     = 0 << 6;  // Read/write, EL1 only
        const AP_RW_ALL     = 1 << 6;  // Read/write, all ELs
        const AP_RO_EL1     = 2 << 6;  // Read-only, EL1 only
        const AP_RO_ALL     = 3 << 6;  // Read-only, all ELs

        /// Access flag (must be 1 to avoid access faults)
        const ACCESSED      = 1 << 10;

        /// Not global (nG)
        const NOT_GLOBAL    = 1 << 11;

        const PXN           = 1 << 53;
        const UXN           = 1 << 54;

        /// Device nGnRnE (MAIR index 0)
        const DEVICE        = Self::ATTR_INDEX_0.bits();

        /// Normal memory, non-cacheable (MAIR index 1)
        const NORMAL_NC     = Self::ATTR_INDEX_1.bits();

        /// Next-level table descriptor
        const TABLE         = Self::VALID.bits() | Self::TABLE_OR_PAGE.bits();

        /// User read/write data page
        const USER_PAGE     = Self::VALID.bits()
                            | Self::TABLE_OR_PAGE.bits()
                            | Self::NORMAL_NC.bits()
                            | Self::AP_RW_ALL.bits()
                            | Self::ACCESSED.bits();
    }
}

/// Page table (one page, 512 descriptors)
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; PTRS_PER_TABLE],
}

static_assertions::assert_eq_size!(PageTable, [u8; 4096]);

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [0; PTRS_PER_TABLE],
        }
    }

    /// Point an entry at `addr` with `flags`
    pub fn set_entry(&mut self, index: usize, addr: PhysAddr, flags: PageTableFlags) {
        debug_assert!(addr.is_page_aligned());
        self.entries[index] = (addr.as_u64() & DESCRIPTOR_ADDR_MASK) | flags.bits();
    }

    /// Output address of a valid entry
    pub fn get_addr(&self, index: usize) -> Option<PhysAddr> {
        let entry = self.entries[index];
        if entry & PageTableFlags::VALID.bits() == 0 {
            return None;
        }
        Some(PhysAddr::new((entry & DESCRIPTOR_ADDR_MASK) as usize))
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.entries[index] & PageTableFlags::VALID.bits() != 0
    }

    pub fn get_flags(&self, index: usize) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.entries[index] & !DESCRIPTOR_ADDR_MASK)
    }

    pub fn clear_entry(&mut self, index: usize) {
        self.entries[index] = 0;
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Translation table level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTableLevel {
    /// Level 0: 512GB per entry (PGD)
    L0 = 0,
    /// Level 1: 1GB per entry (PUD)
    L1 = 1,
    /// Level 2: 2MB per entry (PMD)
    L2 = 2,
    /// Level 3: 4KB per entry (PTE)
    L3 = 3,
}

impl PageTableLevel {
    /// Levels from the root down to the leaf
    pub const WALK: [PageTableLevel; 4] = [
        PageTableLevel::L0,
        PageTableLevel::L1,
        PageTableLevel::L2,
        PageTableLevel::L3,
    ];

    /// Shift of the address bits indexing this level
    ///
    /// `PAGE_SHIFT + TABLE_SHIFT * n` where `n` counts levels above the leaf.
    pub const fn shift(self) -> usize {
        PAGE_SHIFT + TABLE_SHIFT * (3 - self as usize)
    }

    /// Bytes covered by one entry at this level
    pub const fn block_size(self) -> usize {
        1 << self.shift()
    }

    /// Table index for a virtual address at this level
    pub const fn index(self, vaddr: VirtAddr) -> usize {
        (vaddr.as_usize() >> self.shift()) & (PTRS_PER_TABLE - 1)
    }

    pub const fn is_leaf(self) -> bool {
        matches!(self, PageTableLevel::L3)
    }

    pub const fn next(self) -> Option<PageTableLevel> {
        match self {
            PageTableLevel::L0 => Some(PageTableLevel::L1),
            PageTableLevel::L1 => Some(PageTableLevel::L2),
            PageTableLevel::L2 => Some(PageTableLevel::L3),
            PageTableLevel::L3 => None,
        }
    }
}
