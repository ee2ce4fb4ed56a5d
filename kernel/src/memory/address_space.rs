//! Per-task address spaces
//!
//! An [`AddressSpace`] owns a translation table hierarchy rooted at `pgd`
//! together with two bounded lists:
//!
//! - user pages: every (physical, virtual) pair mapped for the task
//! - kernel pages: every frame used as a translation table (root included)
//!
//! Every frame in either list is allocated in the frame allocator and
//! belongs to this address space alone, so [`AddressSpace::release`] can
//! free everything without walking the tables.
//!
//! # Failure semantics
//! Capacity of both lists is checked before anything is allocated. When the
//! frame allocator runs dry part way through a walk, tables already
//! installed stay installed and recorded: the lists always describe exactly
//! what the hierarchy holds.

use core::ptr;

use crate::config::MAX_PROCESS_PAGES;
use crate::error::{KernelError, PageList, Resource, Result};
use crate::memory::frame_allocator::FrameAllocator;
use crate::memory::layout::{PAGE_SIZE, USER_VA_LIMIT};
use crate::memory::paging;
use crate::memory::{PhysAddr, VirtAddr};
use crate::arch::aarch64::page_table::PageTableLevel;

/// A page mapped into a user address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct UserPage {
    pub phys: PhysAddr,
    pub virt: VirtAddr,
}

impl UserPage {
    const EMPTY: Self = Self { phys: PhysAddr::NULL, virt: VirtAddr::NULL };
}

/// Fixed-capacity list (no heap in the kernel)
#[derive(Clone, Copy)]
#[repr(C)]
pub struct FixedList<T: Copy, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy, const N: usize> FixedList<T, N> {
    const fn filled(fill: T) -> Self {
        Self { items: [fill; N], len: 0 }
    }

    /// Append `item`, handing it back when the list is full
    pub fn push(&mut self, item: T) -> core::result::Result<(), T> {
        if self.len == N {
            return Err(item);
        }
        self.items[self.len] = item;
        self.len += 1;
        Ok(())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn remaining(&self) -> usize {
        N - self.len
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// A task's translation tables and the frames it owns
#[repr(C)]
pub struct AddressSpace {
    /// Root (L0) table, null until the first mapping
    pgd: PhysAddr,
    user_pages: FixedList<UserPage, MAX_PROCESS_PAGES>,
    kernel_pages: FixedList<PhysAddr, MAX_PROCESS_PAGES>,
}

impl AddressSpace {
    /// Address space with no tables and no pages
    pub const fn empty() -> Self {
        Self {
            pgd: PhysAddr::NULL,
            user_pages: FixedList::filled(UserPage::EMPTY),
            kernel_pages: FixedList::filled(PhysAddr::NULL),
        }
    }

    /// Root table, once one exists
    pub fn pgd(&self) -> Option<PhysAddr> {
        (!self.pgd.is_null()).then_some(self.pgd)
    }

    pub fn user_pages(&self) -> &[UserPage] {
        self.user_pages.as_slice()
    }

    pub fn kernel_pages(&self) -> &[PhysAddr] {
        self.kernel_pages.as_slice()
    }

    /// Map `va` to the frame `page`
    ///
    /// Missing tables are allocated and recorded as kernel pages; the pair is
    /// recorded as a user page. Mapping an address again to the frame it
    /// already maps changes nothing.
    ///
    /// # Errors
    /// - `Misaligned` if either address is not page aligned
    /// - `AlreadyMapped` if `va` maps a different frame
    /// - `BookkeepingOverflow` if either list lacks room
    /// - `ResourceExhausted(Frames)` if a table cannot be allocated
    pub fn map_page(
        &mut self,
        frames: &mut FrameAllocator,
        va: VirtAddr,
        page: PhysAddr,
    ) -> Result<()> {
        if !va.is_page_aligned() {
            return Err(KernelError::Misaligned { addr: va.as_usize() });
        }
        if !page.is_page_aligned() {
            return Err(KernelError::Misaligned { addr: page.as_usize() });
        }

        let entry = UserPage { phys: page, virt: va };
        let existing = match self.pgd() {
            Some(pgd) => paging::lookup_page(frames, pgd, va),
            None => None,
        };
        if let Some(existing) = existing {
            if existing != page {
                return Err(KernelError::AlreadyMapped { va, existing });
            }
            if !self.user_pages().contains(&entry) {
                self.record_user_page(entry)?;
            }
            return Ok(());
        }

        let needed = paging::missing_tables(frames, self.pgd(), va);
        if self.kernel_pages.remaining() < needed {
            return Err(KernelError::BookkeepingOverflow(PageList::Kernel));
        }
        if self.user_pages.is_full() {
            return Err(KernelError::BookkeepingOverflow(PageList::User));
        }

        let mut table = match self.pgd() {
            Some(pgd) => pgd,
            None => {
                let pgd = frames
                    .alloc()
                    .ok_or(KernelError::ResourceExhausted(Resource::Frames))?;
                self.record_table(pgd)?;
                self.pgd = pgd;
                pgd
            }
        };

        for level in [PageTableLevel::L0, PageTableLevel::L1, PageTableLevel::L2] {
            let step = paging::next_table(frames, table, level, va)?;
            if step.created {
                self.record_table(step.table)?;
            }
            table = step.table;
        }

        paging::set_leaf(frames, table, va, page);
        self.record_user_page(entry)
    }

    /// Allocate a zeroed frame and map it at `va`
    ///
    /// The frame is released again if the mapping fails.
    pub fn allocate_user_page(&mut self, frames: &mut FrameAllocator, va: VirtAddr) -> Result<PhysAddr> {
        let page = frames
            .alloc()
            .ok_or(KernelError::ResourceExhausted(Resource::Frames))?;
        if let Err(err) = self.map_page(frames, va, page) {
            frames.free(page);
            return Err(err);
        }
        Ok(page)
    }

    /// Physical address backing `va`
    ///
    /// Addresses outside the user range never translate; the walk only looks
    /// at bits [47:12].
    pub fn translate(&self, frames: &FrameAllocator, va: VirtAddr) -> Option<PhysAddr> {
        if va.as_usize() >= USER_VA_LIMIT {
            return None;
        }
        paging::translate(frames, self.pgd()?, va)
    }

    /// Copy every page of this address space into `dst`
    ///
    /// Each page gets a fresh frame in `dst` at the same virtual address and
    /// a byte copy of its contents. No page is shared.
    ///
    /// # Errors
    /// Stops at the first page that cannot be allocated or mapped. Pages
    /// copied so far stay recorded in `dst`; the caller discards `dst`.
    pub fn duplicate_into(&self, dst: &mut AddressSpace, frames: &mut FrameAllocator) -> Result<()> {
        for &UserPage { phys, virt } in self.user_pages() {
            let copy = dst.allocate_user_page(frames, virt)?;
            // SAFETY: both frames are live and distinct (`copy` was just allocated).
            unsafe {
                ptr::copy_nonoverlapping(
                    frames.frame_ptr(phys).as_ptr(),
                    frames.frame_ptr(copy).as_ptr(),
                    1,
                );
            }
        }
        Ok(())
    }

    /// Free every frame this address space owns and forget its tables
    ///
    /// Must not be called on the address space that is currently installed.
    pub fn release(&mut self, frames: &mut FrameAllocator) {
        for page in self.user_pages() {
            frames.free(page.phys);
        }
        for &table in self.kernel_pages() {
            frames.free(table);
        }
        self.user_pages.clear();
        self.kernel_pages.clear();
        self.pgd = PhysAddr::NULL;
    }

    /// Copy `buf.len()` bytes from user memory at `va`
    ///
    /// # Errors
    /// `NotMapped` for the first byte without a mapping, or for `va` itself
    /// when the range wraps or leaves the user half.
    pub fn copy_from_user(&self, frames: &FrameAllocator, va: VirtAddr, buf: &mut [u8]) -> Result<()> {
        check_user_range(va, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let at = va.add(done);
            let pa = self.translate(frames, at).ok_or(KernelError::NotMapped { va: at })?;
            let chunk = (PAGE_SIZE - at.page_offset()).min(buf.len() - done);
            // SAFETY: `pa` lies in a live user frame and the chunk stays inside it.
            unsafe {
                let src = frames.frame_ptr(pa.page_base()).as_ptr().cast::<u8>().add(pa.page_offset());
                ptr::copy_nonoverlapping(src, buf[done..].as_mut_ptr(), chunk);
            }
            done += chunk;
        }
        Ok(())
    }

    /// Copy `data` into user memory at `va`
    pub fn copy_to_user(&mut self, frames: &FrameAllocator, va: VirtAddr, data: &[u8]) -> Result<()> {
        check_user_range(va, data.len())?;
        let mut done = 0;
        while done < data.len() {
            let at = va.add(done);
            let pa = self.translate(frames, at).ok_or(KernelError::NotMapped { va: at })?;
            let chunk = (PAGE_SIZE - at.page_offset()).min(data.len() - done);
            // SAFETY: as in `copy_from_user`.
            unsafe {
                let dst = frames.frame_ptr(pa.page_base()).as_ptr().cast::<u8>().add(pa.page_offset());
                ptr::copy_nonoverlapping(data[done..].as_ptr(), dst, chunk);
            }
            done += chunk;
        }
        Ok(())
    }

    fn record_table(&mut self, table: PhysAddr) -> Result<()> {
        self.kernel_pages
            .push(table)
            .map_err(|_| KernelError::BookkeepingOverflow(PageList::Kernel))
    }

    fn record_user_page(&mut self, page: UserPage) -> Result<()> {
        self.user_pages
            .push(page)
            .map_err(|_| KernelError::BookkeepingOverflow(PageList::User))
    }
}

/// `[va, va + len)` must lie below `USER_VA_LIMIT` without wrapping
fn check_user_range(va: VirtAddr, len: usize) -> Result<()> {
    match va.as_usize().checked_add(len) {
        Some(end) if end <= USER_VA_LIMIT => Ok(()),
        _ => Err(KernelError::NotMapped { va }),
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosted;

    fn page_bytes(frames: &FrameAllocator, pa: PhysAddr) -> &[u8] {
        unsafe { &(*frames.frame_ptr(pa).as_ptr()).0 }
    }

    #[test]
    fn test_first_mapping_builds_hierarchy() {
        let mut frames = hosted::frame_allocator(16);
        let mut mm = AddressSpace::empty();
        assert_eq!(mm.pgd(), None);

        let page = frames.alloc().unwrap();
        mm.map_page(&mut frames, VirtAddr::new(0x2000), page).unwrap();

        assert!(mm.pgd().is_some());
        assert_eq!(mm.kernel_pages().len(), 4);
        assert_eq!(mm.user_pages(), &[UserPage { phys: page, virt: VirtAddr::new(0x2000) }]);
        assert_eq!(mm.translate(&frames, VirtAddr::new(0x2abc)), Some(page.add(0xabc)));
        assert_eq!(mm.translate(&frames, VirtAddr::new(0x3000)), None);
        for &table in mm.kernel_pages() {
            assert!(frames.is_allocated(table));
        }
    }

    #[test]
    fn test_map_page_is_idempotent() {
        let mut frames = hosted::frame_allocator(16);
        let mut mm = AddressSpace::empty();
        let page = frames.alloc().unwrap();
        let va = VirtAddr::new(0x40_0000);

        mm.map_page(&mut frames, va, page).unwrap();
        let pgd = mm.pgd().unwrap();
        let descriptor = paging::leaf_descriptor(&frames, pgd, va);
        let free = frames.free_frames();

        mm.map_page(&mut frames, va, page).unwrap();
        assert_eq!(paging::leaf_descriptor(&frames, pgd, va), descriptor);
        assert_eq!(frames.free_frames(), free);
        assert_eq!(mm.user_pages().len(), 1);
        assert_eq!(mm.kernel_pages().len(), 4);
    }

    #[test]
    fn test_remap_to_other_frame_is_refused() {
        let mut frames = hosted::frame_allocator(16);
        let mut mm = AddressSpace::empty();
        let a = frames.alloc().unwrap();
        let b = frames.alloc().unwrap();
        let va = VirtAddr::new(0x1000);

        mm.map_page(&mut frames, va, a).unwrap();
        assert_eq!(
            mm.map_page(&mut frames, va, b),
            Err(KernelError::AlreadyMapped { va, existing: a })
        );
        assert_eq!(mm.translate(&frames, va), Some(a));
    }

    #[test]
    fn test_misaligned_mapping() {
        let mut frames = hosted::frame_allocator(8);
        let mut mm = AddressSpace::empty();
        let page = frames.alloc().unwrap();
        assert_eq!(
            mm.map_page(&mut frames, VirtAddr::new(0x1001), page),
            Err(KernelError::Misaligned { addr: 0x1001 })
        );
        assert_eq!(mm.pgd(), None);
    }

    #[test]
    fn test_user_list_overflow_allocates_nothing() {
        let mut frames = hosted::frame_allocator(64);
        let mut mm = AddressSpace::empty();
        for i in 0..MAX_PROCESS_PAGES {
            mm.allocate_user_page(&mut frames, VirtAddr::new(i * PAGE_SIZE)).unwrap();
        }
        let free = frames.free_frames();

        let far = VirtAddr::new(1 << 39);
        assert_eq!(
            mm.allocate_user_page(&mut frames, far),
            Err(KernelError::BookkeepingOverflow(PageList::User))
        );
        assert_eq!(frames.free_frames(), free);
    }

    #[test]
    fn test_kernel_list_overflow() {
        let mut frames = hosted::frame_allocator(64);
        let mut mm = AddressSpace::empty();
        // Root + 3 tables, then 3 more tables per new L0 slot: 4 + 4 * 3 = 16
        for i in 0..5 {
            mm.allocate_user_page(&mut frames, VirtAddr::new(i << 39)).unwrap();
        }
        assert_eq!(mm.kernel_pages().len(), MAX_PROCESS_PAGES);

        let free = frames.free_frames();
        assert_eq!(
            mm.allocate_user_page(&mut frames, VirtAddr::new(5 << 39)),
            Err(KernelError::BookkeepingOverflow(PageList::Kernel))
        );
        assert_eq!(frames.free_frames(), free);

        // A page under existing tables still fits
        mm.allocate_user_page(&mut frames, VirtAddr::new(0x1000)).unwrap();
    }

    #[test]
    fn test_duplicate_copies_without_sharing() {
        let mut frames = hosted::frame_allocator(32);
        let mut src = AddressSpace::empty();
        let low = VirtAddr::new(0x0);
        let high = VirtAddr::new(0x7FFF_F000);
        src.allocate_user_page(&mut frames, low).unwrap();
        src.allocate_user_page(&mut frames, high).unwrap();
        src.copy_to_user(&frames, low.add(8), b"parent code").unwrap();
        src.copy_to_user(&frames, high.add(0xFF0), b"stack").unwrap();

        let mut dst = AddressSpace::empty();
        src.duplicate_into(&mut dst, &mut frames).unwrap();
        assert_eq!(dst.user_pages().len(), 2);

        for page in src.user_pages() {
            let copy = dst.translate(&frames, page.virt).unwrap();
            assert_ne!(copy, page.phys);
            assert_eq!(page_bytes(&frames, copy), page_bytes(&frames, page.phys));
        }

        src.copy_to_user(&frames, low.add(8), b"PARENT").unwrap();
        let mut buf = [0u8; 11];
        dst.copy_from_user(&frames, low.add(8), &mut buf).unwrap();
        assert_eq!(&buf, b"parent code");
    }

    #[test]
    fn test_duplicate_failure_leaves_consistent_lists() {
        // 4 tables + 2 pages for the source, 4 tables + 1 page for the copy
        let mut frames = hosted::frame_allocator(11);
        let mut src = AddressSpace::empty();
        src.allocate_user_page(&mut frames, VirtAddr::new(0x1000)).unwrap();
        src.allocate_user_page(&mut frames, VirtAddr::new(0x2000)).unwrap();

        let mut dst = AddressSpace::empty();
        assert_eq!(
            src.duplicate_into(&mut dst, &mut frames),
            Err(KernelError::ResourceExhausted(Resource::Frames))
        );
        assert_eq!(dst.user_pages().len(), 1);
        for page in dst.user_pages() {
            assert!(frames.is_allocated(page.phys));
        }
        for &table in dst.kernel_pages() {
            assert!(frames.is_allocated(table));
        }

        dst.release(&mut frames);
        assert_eq!(frames.free_frames(), 5);
        assert_eq!(dst.pgd(), None);
    }

    #[test]
    fn test_release_returns_every_frame() {
        let mut frames = hosted::frame_allocator(16);
        let mut mm = AddressSpace::empty();
        mm.allocate_user_page(&mut frames, VirtAddr::new(0x0)).unwrap();
        mm.allocate_user_page(&mut frames, VirtAddr::new(0x20_0000)).unwrap();
        assert_eq!(frames.free_frames(), 16 - 7);

        mm.release(&mut frames);
        assert_eq!(frames.free_frames(), 16);
        assert!(mm.user_pages().is_empty());
        assert!(mm.kernel_pages().is_empty());
    }

    #[test]
    fn test_user_copy_across_pages() {
        let mut frames = hosted::frame_allocator(16);
        let mut mm = AddressSpace::empty();
        mm.allocate_user_page(&mut frames, VirtAddr::new(0x1000)).unwrap();
        mm.allocate_user_page(&mut frames, VirtAddr::new(0x2000)).unwrap();

        let at = VirtAddr::new(0x1FFC);
        mm.copy_to_user(&frames, at, b"abcdefgh").unwrap();
        let mut buf = [0u8; 8];
        mm.copy_from_user(&frames, at, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdefgh");

        assert_eq!(
            mm.copy_from_user(&frames, VirtAddr::new(0x2FFE), &mut buf),
            Err(KernelError::NotMapped { va: VirtAddr::new(0x3000) })
        );
    }

    #[test]
    fn test_user_copies_stay_below_user_limit() {
        let mut frames = hosted::frame_allocator(16);
        let mut mm = AddressSpace::empty();
        let top = VirtAddr::new(USER_VA_LIMIT - PAGE_SIZE);
        mm.allocate_user_page(&mut frames, top).unwrap();
        mm.copy_to_user(&frames, top.add(PAGE_SIZE - 4), b"tail").unwrap();

        // Kernel-half alias of the same page
        let alias = VirtAddr::new(0xFFFF_0000_0000_0000 | top.as_usize());
        let mut buf = [0u8; 4];
        assert_eq!(mm.translate(&frames, alias), None);
        assert_eq!(
            mm.copy_from_user(&frames, alias, &mut buf),
            Err(KernelError::NotMapped { va: alias })
        );

        // Runs off the end of the user range
        let near_end = top.add(PAGE_SIZE - 2);
        assert_eq!(
            mm.copy_from_user(&frames, near_end, &mut buf),
            Err(KernelError::NotMapped { va: near_end })
        );
        let wrapping = VirtAddr::new(usize::MAX - 1);
        assert_eq!(
            mm.copy_to_user(&frames, wrapping, b"wrap"),
            Err(KernelError::NotMapped { va: wrapping })
        );

        mm.copy_from_user(&frames, top.add(PAGE_SIZE - 4), &mut buf).unwrap();
        assert_eq!(&buf, b"tail");
    }

    #[test]
    fn test_fixed_list_capacity() {
        let mut list: FixedList<u8, 2> = FixedList::filled(0);
        assert!(list.is_empty());
        assert_eq!(list.push(1), Ok(()));
        assert_eq!(list.push(2), Ok(()));
        assert!(list.is_full());
        assert_eq!(list.push(3), Err(3));
        assert_eq!(list.as_slice(), &[1, 2]);
        assert_eq!(list.remaining(), 0);

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }
}
