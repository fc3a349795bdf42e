mod common;

use std::sync::Arc;

use common::{PAGE, data_image, kernel, pattern, text_image};
use vm::{
    MemoryImage, PagingMode, RamMemory, RamSwapFs, Section, SwapFile, SwapFs, VmConfig, VmError,
    VmKernel, Vpn,
};

#[test]
fn test_pages_are_loaded_on_first_touch() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(data_image(1, 2), PagingMode::DemandPaged).unwrap();
    assert_eq!(kernel.frames().stats().allocated, 0);

    let mut buf = vec![0u8; 2 * PAGE];
    assert_eq!(process.read_virtual_memory(0, &mut buf), 2 * PAGE);
    assert_eq!(buf, pattern(1, 2));

    let stats = kernel.stats();
    assert_eq!(stats.image_loads, 2);
    assert_eq!(stats.zero_fills, 0);
    assert_eq!(kernel.frames().stats().allocated, 2);
    kernel.check_invariants();
}

#[test]
fn test_stack_pages_are_zero_filled() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(data_image(2, 1), PagingMode::DemandPaged).unwrap();
    assert_eq!(process.initial_sp(), (1 + 8) * PAGE);

    let mut buf = vec![0xffu8; PAGE];
    assert_eq!(process.read_virtual_memory(process.initial_sp() - PAGE, &mut buf), PAGE);
    assert!(buf.iter().all(|&b| b == 0));
    assert_eq!(kernel.stats().zero_fills, 1);
}

#[test]
fn test_write_across_page_boundary() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(data_image(3, 1), PagingMode::DemandPaged).unwrap();
    let vaddr = 2 * PAGE - 3;
    assert_eq!(process.write_virtual_memory(vaddr, b"boundary"), 8);

    let mut buf = [0u8; 8];
    assert_eq!(process.read_virtual_memory(vaddr, &mut buf), 8);
    assert_eq!(&buf, b"boundary");

    let space = process.address_space();
    assert!(space.translate(Vpn(1)).unwrap().is_dirty());
    assert!(space.translate(Vpn(2)).unwrap().is_dirty());
    assert!(!space.translate(Vpn(0)).unwrap().is_valid());
    kernel.check_invariants();
}

#[test]
fn test_write_to_read_only_page_stops_copy() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(text_image(4, 1), PagingMode::DemandPaged).unwrap();
    assert_eq!(process.write_virtual_memory(0, b"x"), 0);
    assert!(!process.is_exited());

    let mut buf = vec![0u8; PAGE];
    assert_eq!(process.read_virtual_memory(0, &mut buf), PAGE);
    assert_eq!(buf, pattern(4, 1));
    assert!(!process.address_space().translate(Vpn(0)).unwrap().is_dirty());

    let pin = process.pin_page(Vpn(0), true);
    assert_eq!(pin.err(), Some(VmError::ReadOnly));
}

#[test]
fn test_copy_stops_at_end_of_address_space() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(data_image(5, 1), PagingMode::DemandPaged).unwrap();
    let end = process.num_pages() * PAGE;
    assert_eq!(process.num_pages(), 1 + 8 + 1);

    let mut buf = [0u8; 8];
    assert_eq!(process.read_virtual_memory(end - 4, &mut buf), 4);
    assert_eq!(process.read_virtual_memory(end * 10, &mut buf), 0);
    assert_eq!(process.write_virtual_memory(usize::MAX - 2, &buf), 0);
    assert!(!process.is_exited());
}

#[test]
fn test_illegal_fault_terminates_process() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(data_image(6, 1), PagingMode::DemandPaged).unwrap();
    process.handle_page_fault(0).unwrap();
    assert_eq!(kernel.frames().stats().allocated, 1);

    let end = process.num_pages() * PAGE;
    assert_eq!(process.handle_page_fault(end), Err(VmError::IllegalAccess));
    assert!(process.is_exited());
    assert_eq!(kernel.frames().stats().free, 4);
    assert_eq!(kernel.process_count(), 0);
    assert_eq!(process.handle_page_fault(0), Err(VmError::NoSuchProcess));
}

#[test]
fn test_fault_on_resident_page_is_noop() {
    let (kernel, _) = kernel(4);
    let process = kernel.spawn(data_image(7, 1), PagingMode::DemandPaged).unwrap();
    process.handle_page_fault(3).unwrap();
    let frame = process.address_space().translate(Vpn(0)).unwrap().frame();
    process.handle_page_fault(7).unwrap();

    assert_eq!(process.address_space().translate(Vpn(0)).unwrap().frame(), frame);
    let stats = kernel.stats();
    assert_eq!(stats.page_faults, 2);
    assert_eq!(stats.image_loads, 1);
}

#[test]
fn test_eager_mode_loads_every_page() {
    let (kernel, _) = kernel(16);
    let process = kernel.spawn(data_image(8, 2), PagingMode::Eager).unwrap();
    assert_eq!(process.mode(), PagingMode::Eager);
    assert_eq!(process.address_space().resident_pages().len(), 11);

    let stats = kernel.stats();
    assert_eq!(stats.image_loads, 2);
    assert_eq!(stats.zero_fills, 9);

    let mut buf = vec![0u8; 2 * PAGE];
    process.read_virtual_memory(0, &mut buf);
    assert_eq!(buf, pattern(8, 2));
    assert_eq!(kernel.stats().page_faults, 11);
    kernel.check_invariants();
}

#[test]
fn test_eager_mode_requires_enough_free_frames() {
    let (kernel, _) = kernel(4);
    let result = kernel.spawn(data_image(9, 2), PagingMode::Eager);
    assert_eq!(result.err().map(|e| e.to_errno()), Some(-12));
    assert_eq!(kernel.process_count(), 0);
    assert_eq!(kernel.frames().stats().free, 4);
}

#[test]
fn test_fragmented_image_is_rejected() {
    let (kernel, _) = kernel(4);
    let image = MemoryImage::new(PAGE).with_raw_section(
        Section {
            name: ".text".into(),
            first_vpn: 2,
            num_pages: 1,
            read_only: true,
        },
        &[1; PAGE],
    );
    let result = kernel.spawn(Arc::new(image), PagingMode::DemandPaged);
    assert_eq!(result.err(), Some(VmError::FragmentedImage));
    assert_eq!(kernel.process_count(), 0);
}

#[test]
fn test_exit_releases_frames_and_swap_slots() {
    let (kernel, _) = kernel(2);
    let process = kernel.spawn(data_image(10, 3), PagingMode::DemandPaged).unwrap();
    for page in 0..3 {
        assert_eq!(process.write_virtual_memory(page * PAGE, b"dirty"), 5);
    }
    assert!(kernel.swap().slots_in_use() > 0);

    process.exit();
    assert!(process.is_exited());
    assert_eq!(kernel.frames().stats().free, 2);
    assert_eq!(kernel.swap().slots_in_use(), 0);
    assert_eq!(kernel.process_count(), 0);

    let mut buf = [0u8; 4];
    assert_eq!(process.read_virtual_memory(0, &mut buf), 0);
    process.exit();
    kernel.check_invariants();
}

#[test]
fn test_dropping_process_releases_frames() {
    let (kernel, _) = kernel(3);
    {
        let process = kernel.spawn(data_image(11, 1), PagingMode::Eager);
        assert_eq!(process.err(), Some(VmError::OutOfMemory));
    }
    {
        let process = kernel.spawn(data_image(11, 1), PagingMode::DemandPaged).unwrap();
        process.write_virtual_memory(0, &[1; 3 * PAGE]);
        assert_eq!(kernel.frames().stats().free, 0);
    }
    assert_eq!(kernel.frames().stats().free, 3);
    assert_eq!(kernel.process_count(), 0);
}

#[test]
fn test_processes_are_isolated() {
    let (kernel, _) = kernel(4);
    let a = kernel.spawn(data_image(12, 1), PagingMode::DemandPaged).unwrap();
    let b = kernel.spawn(data_image(13, 1), PagingMode::DemandPaged).unwrap();
    assert_ne!(a.pid(), b.pid());

    a.write_virtual_memory(PAGE, b"from a");
    b.write_virtual_memory(PAGE, b"from b");

    let mut buf = [0u8; 6];
    a.read_virtual_memory(PAGE, &mut buf);
    assert_eq!(&buf, b"from a");
    b.read_virtual_memory(PAGE, &mut buf);
    assert_eq!(&buf, b"from b");
    kernel.check_invariants();
}

struct NoSwapFs;

impl SwapFs for NoSwapFs {
    fn open(&self, _name: &str, _create: bool) -> Result<Arc<dyn SwapFile>, isize> {
        Err(-28)
    }
}

#[test]
fn test_kernel_start_failures() {
    common::init();
    let config = VmConfig::new(PAGE, 4);
    let small = Arc::new(RamMemory::new(3 * PAGE));
    assert_eq!(
        VmKernel::new(config, small, &RamSwapFs::new()).err(),
        Some(VmError::InvalidConfig)
    );

    let memory = Arc::new(RamMemory::new(4 * PAGE));
    assert_eq!(
        VmKernel::new(config, memory, &NoSwapFs).err(),
        Some(VmError::SwapUnavailable)
    );
    assert_eq!(
        VmKernel::with_ram(VmConfig::new(100, 4)).err(),
        Some(VmError::InvalidConfig)
    );
}

#[test]
fn test_swap_file_is_opened_by_name() {
    common::init();
    let fs = RamSwapFs::new();
    let memory = Arc::new(RamMemory::new(PAGE));
    let kernel = VmKernel::new(VmConfig::new(PAGE, 1), memory, &fs).unwrap();
    let process = kernel.spawn(data_image(14, 2), PagingMode::DemandPaged).unwrap();
    process.write_virtual_memory(0, b"spill");
    process.write_virtual_memory(PAGE, b"spill");

    let file = fs.get(vm::SWAP_FILE_NAME).unwrap();
    assert_eq!(file.len(), PAGE);
}
