//! Kernel thread -> user process transition

use log::info;

use crate::arch::aarch64::context::TrapFrame;
use crate::arch::Cpu;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::memory::address_space::AddressSpace;
use crate::memory::frame_allocator::FrameAllocator;
use crate::memory::layout::{PAGE_SIZE, USER_STACK_TOP};
use crate::memory::VirtAddr;

impl<C: Cpu> Kernel<C> {
    /// Prepare the current task to enter EL0
    ///
    /// Loads `image` into fresh user pages starting at virtual address 0,
    /// maps one stack page below [`USER_STACK_TOP`], and sets up the trap
    /// frame so the exit path resumes at `pc` in EL0 with `sp_el0` at the
    /// stack top. The task's table becomes the active user table.
    ///
    /// # Errors
    /// Fails if a page cannot be allocated or mapped. Pages mapped before
    /// the failure stay owned by the task, which remains a kernel thread
    /// with its trap frame untouched.
    pub fn move_to_user_mode(&mut self, image: &[u8], pc: VirtAddr) -> Result<()> {
        let _guard = self.preempt_guard();
        // SAFETY: the current page is live; `self.frames` is a separate field.
        let page = unsafe { self.current.as_mut() };
        let loaded = load_image(page.task.mm_mut(), &mut self.frames, image);

        if let Some(pgd) = page.task.mm().pgd() {
            // SAFETY: built by the task's AddressSpace.
            unsafe { self.cpu.set_user_table(pgd) };
        }
        loaded?;

        page.trap_frame = TrapFrame::user(pc.as_u64(), USER_STACK_TOP as u64);
        page.task.become_user_process();
        info!(
            "pid {} entering user mode at {} ({} byte image)",
            page.task.pid(),
            pc,
            image.len()
        );
        Ok(())
    }
}

/// Image pages from address 0 up, then the stack page
fn load_image(mm: &mut AddressSpace, frames: &mut FrameAllocator, image: &[u8]) -> Result<()> {
    for (i, chunk) in image.chunks(PAGE_SIZE).enumerate() {
        let va = VirtAddr::new(i * PAGE_SIZE);
        mm.allocate_user_page(frames, va)?;
        mm.copy_to_user(frames, va, chunk)?;
    }
    mm.allocate_user_page(frames, VirtAddr::new(USER_STACK_TOP - PAGE_SIZE))?;
    Ok(())
}
