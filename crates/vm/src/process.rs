//! 用户进程的内存视图
//!
//! [`Process`] 把地址空间与所属的 [`VmKernel`] 绑定在一起，
//! 提供缺页入口、内核对用户内存的读写以及退出时的回收。

use crate::address::{Pid, Vpn};
use crate::address_space::AddressSpace;
use crate::error::{VmError, VmResult};
use crate::fault;
use crate::frame_table::PinGuard;
use crate::image::ProgramImage;
use crate::kernel::VmKernel;
use alloc::sync::Arc;
use core::ops::Range;

/// 进程的调页方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// 按需调页：首次访问时才装入
    DemandPaged,
    /// 创建时装入全部页；空闲帧不足时创建失败
    Eager,
}

/// 用户进程
pub struct Process {
    kernel: Arc<VmKernel>,
    space: Arc<AddressSpace>,
    mode: PagingMode,
}

impl Process {
    /// 创建进程并登记其地址空间
    pub fn new(
        kernel: Arc<VmKernel>,
        image: Arc<dyn ProgramImage>,
        mode: PagingMode,
    ) -> VmResult<Self> {
        let space = kernel.register(image)?;
        let process = Self {
            kernel,
            space,
            mode,
        };
        if mode == PagingMode::Eager {
            process.load_all()?;
        }
        Ok(process)
    }

    fn load_all(&self) -> VmResult<()> {
        let needed = self.space.num_pages();
        let free = self.kernel.frames().stats().free;
        if needed > free {
            log::warn!("vm: {} needs {} frames, only {} free", self.pid(), needed, free);
            return Err(VmError::OutOfMemory);
        }
        let page_size = self.kernel.config().page_size;
        for n in 0..needed {
            fault::handle_fault(&self.kernel, &self.space, n * page_size)?;
        }
        Ok(())
    }

    /// 进程号
    pub fn pid(&self) -> Pid {
        self.space.pid()
    }

    /// 调页方式
    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    /// 地址空间
    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    /// 所属的管理器
    pub fn kernel(&self) -> &Arc<VmKernel> {
        &self.kernel
    }

    /// 页数
    pub fn num_pages(&self) -> usize {
        self.space.num_pages()
    }

    /// 初始栈指针
    pub fn initial_sp(&self) -> usize {
        self.space.layout().initial_sp(self.kernel.config().page_size)
    }

    /// 处理用户态访问 `vaddr` 引发的缺页
    ///
    /// 出错时进程被终止，错误返回给陷入处理程序。
    pub fn handle_page_fault(&self, vaddr: usize) -> VmResult<()> {
        fault::handle_fault(&self.kernel, &self.space, vaddr).inspect_err(|e| {
            if e.is_fatal_to_process() {
                log::error!("vm: {} killed by page fault at {:#x}: {}", self.pid(), vaddr, e);
                self.exit();
            }
        })
    }

    /// 钉住 `vpn` 所在的帧，必要时先将其调入
    ///
    /// 返回的 guard 存活期间可以安全地直接读写该帧。
    pub fn pin_page(&self, vpn: Vpn, is_write: bool) -> VmResult<PinGuard<'_>> {
        let page_size = self.kernel.config().page_size;
        loop {
            if let Some(pin) = self
                .kernel
                .frames()
                .pin_resident(&self.space, vpn, is_write)?
            {
                return Ok(pin);
            }
            fault::handle_fault(&self.kernel, &self.space, vpn.as_usize() * page_size)?;
        }
    }

    /// 从用户地址 `vaddr` 读取到 `buf`，返回实际读取的字节数
    ///
    /// 遇到非法地址时停止，不终止进程。
    pub fn read_virtual_memory(&self, vaddr: usize, buf: &mut [u8]) -> usize {
        let memory = self.kernel.memory();
        self.transfer(vaddr, buf.len(), false, |paddr, range| memory.read(paddr, &mut buf[range]))
    }

    /// 把 `data` 写入用户地址 `vaddr`，返回实际写入的字节数
    ///
    /// 遇到非法地址或只读页时停止，不终止进程。
    pub fn write_virtual_memory(&self, vaddr: usize, data: &[u8]) -> usize {
        let memory = self.kernel.memory();
        self.transfer(vaddr, data.len(), true, |paddr, range| memory.write(paddr, &data[range]))
    }

    /// 逐页钉住并拷贝，`copy` 的参数为物理地址与缓冲区内的区间
    fn transfer(
        &self,
        vaddr: usize,
        len: usize,
        is_write: bool,
        mut copy: impl FnMut(usize, Range<usize>),
    ) -> usize {
        let config = *self.kernel.config();
        let mut done = 0;
        while done < len {
            let Some(addr) = vaddr.checked_add(done) else {
                break;
            };
            let offset = config.offset_of(addr);
            let chunk = (config.page_size - offset).min(len - done);
            let pin = match self.pin_page(config.vpn_of(addr), is_write) {
                Ok(pin) => pin,
                Err(e) => {
                    log::debug!("vm: {} copy stopped at {:#x}: {}", self.pid(), addr, e);
                    break;
                }
            };
            copy(config.paddr(pin.ppn(), offset), done..done + chunk);
            drop(pin);
            done += chunk;
        }
        done
    }

    /// 释放进程占用的全部帧与交换槽；可重复调用
    pub fn exit(&self) {
        self.kernel.teardown(&self.space);
    }

    /// 是否已经退出
    pub fn is_exited(&self) -> bool {
        self.space.is_exited()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.exit();
    }
}
