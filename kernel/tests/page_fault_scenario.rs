//! Demand paging end to end

use tern_kernel::error::KernelError;
use tern_kernel::hosted::{self, HostCpu};
use tern_kernel::memory::layout::PAGE_SIZE;
use tern_kernel::{Kernel, KernelConfig, VirtAddr};

/// Data abort, translation fault at level 3
const ESR_TRANSLATION: u64 = 0x9200_0007;
/// Data abort, permission fault at level 3
const ESR_PERMISSION: u64 = 0x9200_000F;

const HEAP: usize = 0x40_0000;

fn user_kernel(config: KernelConfig) -> Kernel<HostCpu> {
    let mut kernel = hosted::kernel(64, config).unwrap();
    kernel.move_to_user_mode(b"\x00\x00\x00\x14", VirtAddr::new(0)).unwrap();
    kernel
}

#[test]
fn test_faulting_access_succeeds_on_retry() {
    let mut kernel = user_kernel(KernelConfig::default());
    let pid = kernel.current_pid();
    let addr = VirtAddr::new(HEAP + 0x10);

    let mut buf = [0u8; 4];
    assert_eq!(
        kernel.read_user(pid, addr, &mut buf),
        Err(KernelError::NotMapped { va: addr })
    );

    kernel.handle_page_fault(addr, ESR_TRANSLATION).unwrap();
    kernel.write_user(pid, addr, &[1, 2, 3, 4]).unwrap();
    kernel.read_user(pid, addr, &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);

    // Exactly one page, at the page boundary
    let pages = kernel.current_task().mm().user_pages();
    assert_eq!(pages.last().unwrap().virt, VirtAddr::new(HEAP));
    let next_page = VirtAddr::new(HEAP + PAGE_SIZE);
    assert!(kernel.current_task().mm().translate(kernel.frames(), next_page).is_none());
    assert_eq!(kernel.faults_serviced(), 1);
}

#[test]
fn test_permission_fault_is_terminal() {
    let mut kernel = user_kernel(KernelConfig::default());
    let free = kernel.frames().free_frames();
    let pages = kernel.current_task().mm().user_pages().len();

    let addr = VirtAddr::new(0x10);
    assert_eq!(
        kernel.handle_page_fault(addr, ESR_PERMISSION),
        Err(KernelError::InvalidFault { addr, esr: ESR_PERMISSION })
    );
    assert_eq!(kernel.frames().free_frames(), free);
    assert_eq!(kernel.current_task().mm().user_pages().len(), pages);
}

#[test]
fn test_demand_pages_are_copied_by_fork() {
    let mut kernel = user_kernel(KernelConfig::default());
    let parent = kernel.current_pid();
    let addr = VirtAddr::new(HEAP);
    kernel.handle_page_fault(addr, ESR_TRANSLATION).unwrap();
    kernel.write_user(parent, addr, b"heap").unwrap();

    let child = kernel.fork().unwrap();
    let mut buf = [0u8; 4];
    kernel.read_user(child, addr, &mut buf).unwrap();
    assert_eq!(&buf, b"heap");
}

#[test]
fn test_fault_limit_is_global() {
    let mut kernel = user_kernel(KernelConfig::default().with_fault_limit(1));
    kernel.handle_page_fault(VirtAddr::new(HEAP), ESR_TRANSLATION).unwrap();

    let child = kernel.fork().unwrap();
    kernel.yield_now();
    kernel.schedule_tail();
    assert_eq!(kernel.current_pid(), child);
    assert_eq!(
        kernel.handle_page_fault(VirtAddr::new(HEAP + PAGE_SIZE), ESR_TRANSLATION),
        Err(KernelError::FaultLimitReached { serviced: 1 })
    );
}
