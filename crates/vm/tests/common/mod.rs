//! 集成测试的公共设施：协作者注册，以及带计数的物理内存与交换文件替身。

#![allow(dead_code)]

mod collab;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use vm::{
    MemoryImage, PhysMemory, ProgramImage, RamMemory, RamSwapFile, SwapFile, SwapFs, VmConfig,
    VmKernel,
};

pub use collab::init;

pub const PAGE: usize = 64;

pub fn config(frames: usize) -> VmConfig {
    VmConfig::new(PAGE, frames)
}

/// 以普通 RAM 和带计数的交换文件构造内核
pub fn kernel(frames: usize) -> (Arc<VmKernel>, Arc<TestSwapFile>) {
    init();
    let fs = TestSwapFs::default();
    let memory = Arc::new(RamMemory::new(frames * PAGE));
    let kernel = VmKernel::new(config(frames), memory, &fs).unwrap();
    let file = fs.file.clone();
    file.attach(&kernel);
    (kernel, file)
}

/// 第 `n` 页的字节由 `seed` 与 `n` 推出
pub fn pattern(seed: u8, pages: usize) -> Vec<u8> {
    (0..pages * PAGE)
        .map(|i| seed.wrapping_add((i / PAGE) as u8).wrapping_mul(31).wrapping_add(i as u8))
        .collect()
}

/// 单个可写段，内容为 `pattern(seed, pages)`
pub fn data_image(seed: u8, pages: usize) -> Arc<dyn ProgramImage> {
    Arc::new(MemoryImage::new(PAGE).with_section(".data", false, &pattern(seed, pages)))
}

/// 单个只读段，内容为 `pattern(seed, pages)`
pub fn text_image(seed: u8, pages: usize) -> Arc<dyn ProgramImage> {
    Arc::new(MemoryImage::new(PAGE).with_section(".text", true, &pattern(seed, pages)))
}

/// 统计读写次数的交换文件
///
/// 可以让写入失败，并在每次写回时记下当时的空闲帧数。
#[derive(Default)]
pub struct TestSwapFile {
    inner: RamSwapFile,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_writes: AtomicBool,
    kernel: OnceLock<Weak<VmKernel>>,
    pub free_frames_at_write: Mutex<Vec<usize>>,
}

impl TestSwapFile {
    pub fn attach(&self, kernel: &Arc<VmKernel>) {
        let _ = self.kernel.set(Arc::downgrade(kernel));
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl SwapFile for TestSwapFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(-5);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(kernel) = self.kernel.get().and_then(Weak::upgrade) {
            let free = kernel.frames().stats().free;
            self.free_frames_at_write.lock().unwrap().push(free);
        }
        self.inner.write_at(offset, buf)
    }
}

#[derive(Default)]
pub struct TestSwapFs {
    pub file: Arc<TestSwapFile>,
}

impl SwapFs for TestSwapFs {
    fn open(&self, name: &str, _create: bool) -> Result<Arc<dyn SwapFile>, isize> {
        assert_eq!(name, vm::SWAP_FILE_NAME);
        Ok(self.file.clone())
    }
}

/// 记录每次触及未钉住帧的拷贝
pub struct PinCheckingMemory {
    inner: RamMemory,
    kernel: OnceLock<Weak<VmKernel>>,
    pub copies: AtomicUsize,
    pub unpinned_copies: AtomicUsize,
}

impl PinCheckingMemory {
    pub fn new(frames: usize) -> Self {
        Self {
            inner: RamMemory::new(frames * PAGE),
            kernel: OnceLock::new(),
            copies: AtomicUsize::new(0),
            unpinned_copies: AtomicUsize::new(0),
        }
    }

    pub fn attach(&self, kernel: &Arc<VmKernel>) {
        let _ = self.kernel.set(Arc::downgrade(kernel));
    }

    fn check(&self, paddr: usize, len: usize) {
        self.copies.fetch_add(1, Ordering::SeqCst);
        let Some(kernel) = self.kernel.get().and_then(Weak::upgrade) else {
            return;
        };
        let first = paddr / PAGE;
        let last = (paddr + len.max(1) - 1) / PAGE;
        for ppn in first..=last {
            if !kernel.frames().is_pinned(vm::Ppn(ppn)) {
                self.unpinned_copies.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

impl PhysMemory for PinCheckingMemory {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn read(&self, paddr: usize, buf: &mut [u8]) {
        self.check(paddr, buf.len());
        self.inner.read(paddr, buf);
    }

    fn write(&self, paddr: usize, data: &[u8]) {
        self.check(paddr, data.len());
        self.inner.write(paddr, data);
    }

    fn fill(&self, paddr: usize, len: usize, byte: u8) {
        self.check(paddr, len);
        self.inner.fill(paddr, len, byte);
    }
}
