//! Translation table walking
//!
//! Tables live in frames handed out by the [`FrameAllocator`] and are
//! reached through its kernel window. Descriptors store physical addresses;
//! every step down the hierarchy goes back through the window.
//!
//! Only 4KB leaf mappings are created: L0 -> L1 -> L2 are table descriptors
//! and L3 holds page descriptors.

use crate::arch::aarch64::page_table::{PageTable, PageTableFlags, PageTableLevel};
use crate::error::{KernelError, Resource, Result};
use crate::memory::frame_allocator::FrameAllocator;
use crate::memory::{PhysAddr, VirtAddr};

/// One step down the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStep {
    /// Next-level table
    pub table: PhysAddr,
    /// The table was allocated by this step; the caller owns it now
    pub created: bool,
}

/// Shared view of the table stored in frame `pa`
///
/// # Safety
/// `pa` must be a live frame of `frames` holding a translation table, with
/// no outstanding mutable reference to it.
unsafe fn table<'a>(frames: &FrameAllocator, pa: PhysAddr) -> &'a PageTable {
    &*frames.frame_ptr(pa).as_ptr().cast::<PageTable>()
}

/// Mutable view of the table stored in frame `pa`
///
/// # Safety
/// As [`table`], and no other reference to the table may be live.
unsafe fn table_mut<'a>(frames: &FrameAllocator, pa: PhysAddr) -> &'a mut PageTable {
    &mut *frames.frame_ptr(pa).as_ptr().cast::<PageTable>()
}

/// Descend from `parent` (a table at `level`) toward `va`
///
/// Reuses the next-level table when the slot already holds a valid
/// descriptor; otherwise allocates a zeroed table and installs a table
/// descriptor for it.
pub fn next_table(
    frames: &mut FrameAllocator,
    parent: PhysAddr,
    level: PageTableLevel,
    va: VirtAddr,
) -> Result<TableStep> {
    debug_assert!(!level.is_leaf());
    let index = level.index(va);

    // SAFETY: `parent` is one of the caller's tables.
    if let Some(existing) = unsafe { table(frames, parent) }.get_addr(index) {
        return Ok(TableStep { table: existing, created: false });
    }

    let new_table = frames
        .alloc()
        .ok_or(KernelError::ResourceExhausted(Resource::Frames))?;
    // SAFETY: as above; the allocator zeroed `new_table`, which is a valid empty table.
    unsafe { table_mut(frames, parent) }.set_entry(index, new_table, PageTableFlags::TABLE);
    Ok(TableStep { table: new_table, created: true })
}

/// Install a user page descriptor for `va` in the leaf table `l3`
pub fn set_leaf(frames: &FrameAllocator, l3: PhysAddr, va: VirtAddr, page: PhysAddr) {
    // SAFETY: `l3` is a leaf table of the caller's hierarchy.
    unsafe { table_mut(frames, l3) }.set_entry(
        PageTableLevel::L3.index(va),
        page,
        PageTableFlags::USER_PAGE,
    );
}

/// Raw leaf descriptor for `va`, if every level down to L3 exists
pub fn leaf_descriptor(frames: &FrameAllocator, pgd: PhysAddr, va: VirtAddr) -> Option<u64> {
    let mut current = pgd;
    for level in PageTableLevel::WALK {
        // SAFETY: every table reached from `pgd` belongs to the same hierarchy.
        let t = unsafe { table(frames, current) };
        let index = level.index(va);
        if level.is_leaf() {
            return t.is_valid(index).then(|| t.entries[index]);
        }
        current = t.get_addr(index)?;
    }
    None
}

/// Frame mapped at the page containing `va`
pub fn lookup_page(frames: &FrameAllocator, pgd: PhysAddr, va: VirtAddr) -> Option<PhysAddr> {
    let mut current = pgd;
    for level in PageTableLevel::WALK {
        // SAFETY: see `leaf_descriptor`.
        current = unsafe { table(frames, current) }.get_addr(level.index(va))?;
    }
    Some(current)
}

/// Physical address backing `va`, offset included
pub fn translate(frames: &FrameAllocator, pgd: PhysAddr, va: VirtAddr) -> Option<PhysAddr> {
    lookup_page(frames, pgd, va).map(|page| page.add(va.page_offset()))
}

/// Tables a mapping of `va` would have to allocate
///
/// Counts the root when `pgd` is `None`.
pub fn missing_tables(frames: &FrameAllocator, pgd: Option<PhysAddr>, va: VirtAddr) -> usize {
    // Tables below the root: L1, L2, L3
    const BELOW_ROOT: usize = 3;

    let Some(mut current) = pgd else {
        return BELOW_ROOT + 1;
    };
    for (depth, level) in PageTableLevel::WALK[..3].iter().enumerate() {
        // SAFETY: see `leaf_descriptor`.
        match unsafe { table(frames, current) }.get_addr(level.index(va)) {
            Some(next) => current = next,
            None => return BELOW_ROOT - depth,
        }
    }
    0
}
