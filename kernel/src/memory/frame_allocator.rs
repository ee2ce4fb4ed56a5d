//! Physical frame allocator
//!
//! Bitmap allocator over the paging region. Frame `i` lives at
//! `phys_base + i * PAGE_SIZE`; the kernel touches its contents through a
//! linear window (`window + i`), never by dereferencing the physical address.
//!
//! # Implementation Notes
//! - Lowest free frame first, full bitmap words skipped
//! - Every frame is zeroed before it is handed out
//! - Not interrupt-safe: callers hold a preemption guard while allocating

use core::ptr::NonNull;

use log::warn;

use super::address::{PhysAddr, VirtAddr};
use super::bitmap::{Bitmap, MAX_BITS};
use super::layout::{LOW_MEMORY, PAGE_SIZE, PAGING_PAGES, VA_START};

/// One page of memory, as seen through the kernel window
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct Frame(pub [u8; PAGE_SIZE]);

impl Frame {
    pub const fn zeroed() -> Self {
        Frame([0; PAGE_SIZE])
    }
}

static_assertions::assert_eq_size!(Frame, [u8; PAGE_SIZE]);

/// Physical frame allocator
pub struct FrameAllocator {
    /// Allocation bitmap (1 = allocated, 0 = free)
    bitmap: Bitmap,

    /// Number of frames managed by this allocator
    total_frames: usize,

    /// Number of frames currently free
    free_frames: usize,

    /// Physical address of frame 0
    phys_base: PhysAddr,

    /// Kernel-visible address of frame 0
    window: NonNull<Frame>,
}

// The allocator is only reached through the kernel's single owner.
unsafe impl Send for FrameAllocator {}

impl FrameAllocator {
    /// Create an allocator over `frames` frames starting at `phys_base`
    ///
    /// Frames beyond the bitmap capacity are ignored.
    ///
    /// # Safety
    /// - `window` must be the kernel mapping of physical memory
    ///   `[phys_base, phys_base + frames * PAGE_SIZE)`
    /// - That memory must be unused by anything else for the allocator's lifetime
    pub unsafe fn new(phys_base: PhysAddr, window: NonNull<Frame>, frames: usize) -> Self {
        debug_assert!(phys_base.is_page_aligned());
        let total_frames = frames.min(MAX_BITS);
        Self {
            bitmap: Bitmap::new(),
            total_frames,
            free_frames: total_frames,
            phys_base,
            window,
        }
    }

    /// Allocator over the board paging region, reached through the linear map
    ///
    /// # Safety
    /// The linear map at `VA_START` must cover `[LOW_MEMORY, HIGH_MEMORY)` and
    /// nothing else may use that range.
    pub unsafe fn from_linear_map() -> Self {
        let window = NonNull::new_unchecked((VA_START + LOW_MEMORY) as *mut Frame);
        Self::new(PhysAddr::new(LOW_MEMORY), window, PAGING_PAGES)
    }

    /// Allocate one zeroed frame
    ///
    /// Returns `None` when every frame is in use.
    pub fn alloc(&mut self) -> Option<PhysAddr> {
        let Some(idx) = self.bitmap.find_first_unset(self.total_frames) else {
            warn!("out of physical frames ({} total)", self.total_frames);
            return None;
        };
        self.bitmap.set(idx);
        self.free_frames -= 1;

        let pa = self.phys_base.add(idx * PAGE_SIZE);
        // SAFETY: idx < total_frames, so the frame lies inside the window we own.
        unsafe { self.frame_ptr(pa).as_ptr().write_bytes(0, 1) };
        Some(pa)
    }

    /// Return a frame to the pool
    ///
    /// The caller must not release a frame twice or one it never received.
    /// Addresses outside the managed range are ignored.
    pub fn free(&mut self, pa: PhysAddr) {
        let Some(idx) = self.index_of(pa) else {
            warn!("free of unmanaged frame {}", pa);
            return;
        };
        debug_assert!(self.bitmap.is_set(idx), "double free of frame {}", pa);
        if self.bitmap.is_set(idx) {
            self.bitmap.clear(idx);
            self.free_frames += 1;
        }
    }

    /// Is `pa` a frame handed out by this allocator and not yet released?
    pub fn is_allocated(&self, pa: PhysAddr) -> bool {
        self.index_of(pa).is_some_and(|idx| self.bitmap.is_set(idx))
    }

    /// Does `pa` name a frame in the managed range?
    pub fn contains(&self, pa: PhysAddr) -> bool {
        self.index_of(pa).is_some()
    }

    /// Kernel pointer to the frame at `pa`
    ///
    /// `pa` must be a frame in the managed range.
    pub fn frame_ptr(&self, pa: PhysAddr) -> NonNull<Frame> {
        debug_assert!(self.contains(pa), "frame {} outside allocator window", pa);
        let idx = (pa.as_usize() - self.phys_base.as_usize()) / PAGE_SIZE;
        // SAFETY: in range per the contract above, and the window is non-null.
        unsafe { NonNull::new_unchecked(self.window.as_ptr().add(idx)) }
    }

    /// Kernel virtual address of the frame at `pa`
    pub fn virt_addr(&self, pa: PhysAddr) -> VirtAddr {
        VirtAddr::new(self.frame_ptr(pa).as_ptr() as usize)
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn free_frames(&self) -> usize {
        self.free_frames
    }

    pub fn phys_base(&self) -> PhysAddr {
        self.phys_base
    }

    fn index_of(&self, pa: PhysAddr) -> Option<usize> {
        let offset = pa.as_usize().checked_sub(self.phys_base.as_usize())?;
        let idx = offset / PAGE_SIZE;
        (pa.is_page_aligned() && idx < self.total_frames).then_some(idx)
    }
}
