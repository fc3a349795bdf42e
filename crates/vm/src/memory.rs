//! 物理内存
//!
//! 物理内存被视为一块平坦的字节数组，地址为 `ppn * page_size + offset`。
//! 越界访问是内核 bug，会直接 panic。

use alloc::vec;
use alloc::vec::Vec;
use sync::SpinLock;

/// 物理内存访问接口
pub trait PhysMemory: Send + Sync {
    /// 总字节数
    fn size(&self) -> usize;

    /// 从 `paddr` 开始读取 `buf.len()` 字节
    fn read(&self, paddr: usize, buf: &mut [u8]);

    /// 从 `paddr` 开始写入 `data`
    fn write(&self, paddr: usize, data: &[u8]);

    /// 将 `[paddr, paddr + len)` 填充为 `byte`
    fn fill(&self, paddr: usize, len: usize, byte: u8);
}

/// 基于内存数组的物理内存
pub struct RamMemory {
    bytes: SpinLock<Vec<u8>>,
}

impl RamMemory {
    /// 创建 `size` 字节、全零的物理内存
    pub fn new(size: usize) -> Self {
        Self {
            bytes: SpinLock::new(vec![0; size]),
        }
    }
}

impl PhysMemory for RamMemory {
    fn size(&self) -> usize {
        self.bytes.lock().len()
    }

    fn read(&self, paddr: usize, buf: &mut [u8]) {
        let bytes = self.bytes.lock();
        buf.copy_from_slice(&bytes[paddr..paddr + buf.len()]);
    }

    fn write(&self, paddr: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        bytes[paddr..paddr + data.len()].copy_from_slice(data);
    }

    fn fill(&self, paddr: usize, len: usize, byte: u8) {
        let mut bytes = self.bytes.lock();
        bytes[paddr..paddr + len].fill(byte);
    }
}
