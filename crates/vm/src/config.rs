//! 虚拟内存管理器配置
//!
//! 内核启动时构造一次 [`VmConfig`] 并交给 [`VmKernel`](crate::VmKernel)，之后只读。

use crate::address::{Ppn, Vpn};
use crate::error::{VmError, VmResult};

/// 默认页大小（1 KiB）
pub const DEFAULT_PAGE_SIZE: usize = 0x400;

/// 默认物理帧数量
pub const DEFAULT_PHYS_PAGES: usize = 16;

/// 每个进程的默认用户栈页数
pub const DEFAULT_STACK_PAGES: usize = 8;

/// 每个进程的参数页数
pub const DEFAULT_ARG_PAGES: usize = 1;

/// 交换文件的固定名称
pub const SWAP_FILE_NAME: &str = "swapfile";

/// 虚拟内存管理器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// 页大小（字节），必须是 2 的幂
    pub page_size: usize,
    /// 物理帧数量
    pub num_phys_pages: usize,
    /// 每个进程的栈页数
    pub stack_pages: usize,
    /// 每个进程的参数页数
    pub arg_pages: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_PHYS_PAGES)
    }
}

impl VmConfig {
    /// 以默认的栈页数和参数页数创建配置
    pub const fn new(page_size: usize, num_phys_pages: usize) -> Self {
        Self {
            page_size,
            num_phys_pages,
            stack_pages: DEFAULT_STACK_PAGES,
            arg_pages: DEFAULT_ARG_PAGES,
        }
    }

    /// 修改每个进程的栈页数
    pub const fn with_stack_pages(mut self, stack_pages: usize) -> Self {
        self.stack_pages = stack_pages;
        self
    }

    /// 修改每个进程的参数页数
    pub const fn with_arg_pages(mut self, arg_pages: usize) -> Self {
        self.arg_pages = arg_pages;
        self
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> VmResult<()> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            log::error!("vm: page size {:#x} is not a power of two", self.page_size);
            return Err(VmError::InvalidConfig);
        }
        if self.num_phys_pages == 0 {
            log::error!("vm: no physical frames configured");
            return Err(VmError::InvalidConfig);
        }
        if self.num_phys_pages.checked_mul(self.page_size).is_none() {
            return Err(VmError::InvalidConfig);
        }
        Ok(())
    }

    /// 物理内存总字节数
    pub fn memory_size(&self) -> usize {
        self.num_phys_pages * self.page_size
    }

    /// 包含 `vaddr` 的虚拟页号
    #[inline]
    pub fn vpn_of(&self, vaddr: usize) -> Vpn {
        Vpn(vaddr / self.page_size)
    }

    /// `vaddr` 的页内偏移
    #[inline]
    pub fn offset_of(&self, vaddr: usize) -> usize {
        vaddr % self.page_size
    }

    /// 物理帧内偏移 `offset` 处的物理地址
    #[inline]
    pub fn paddr(&self, ppn: Ppn, offset: usize) -> usize {
        debug_assert!(offset < self.page_size);
        ppn.as_usize() * self.page_size + offset
    }
}
