//! 进程地址空间
//!
//! 地址空间是一个单级页表：第 `n` 个表项对应虚拟页 `n`。
//!
//! 布局从第 0 页开始依次为：
//!
//! 1. 程序镜像的各个段，必须从第 0 页起连续排列
//! 2. `stack_pages` 个栈页（按需清零）
//! 3. `arg_pages` 个参数页（按需清零）
//!
//! 初始栈指针位于栈区顶端。

use crate::address::{Pid, Ppn, Vpn};
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::image::ProgramImage;
use crate::translation::TranslationEntry;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use sync::SpinLock;

/// 地址空间的页布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// 程序段占用的页数
    pub section_pages: usize,
    /// 栈页数
    pub stack_pages: usize,
    /// 参数页数
    pub arg_pages: usize,
}

impl Layout {
    /// 检查镜像的段布局并计算整体布局
    ///
    /// 段必须按顺序从第 0 页开始首尾相接，否则返回 [`VmError::FragmentedImage`]。
    pub fn for_image(image: &dyn ProgramImage, config: &VmConfig) -> VmResult<Self> {
        let mut next_vpn = 0;
        for section in image.sections() {
            if section.first_vpn != next_vpn {
                log::warn!(
                    "vm: fragmented executable, section {} starts at page {} instead of {}",
                    section.name,
                    section.first_vpn,
                    next_vpn
                );
                return Err(VmError::FragmentedImage);
            }
            next_vpn += section.num_pages;
        }
        Ok(Self {
            section_pages: next_vpn,
            stack_pages: config.stack_pages,
            arg_pages: config.arg_pages,
        })
    }

    /// 总页数
    pub fn num_pages(&self) -> usize {
        self.section_pages + self.stack_pages + self.arg_pages
    }

    /// 初始栈指针（栈区顶端）
    pub fn initial_sp(&self, page_size: usize) -> usize {
        (self.section_pages + self.stack_pages) * page_size
    }
}

/// 缺页时页面内容的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    /// 来自程序镜像第 `section` 段的第 `page` 页
    Image {
        /// 段序号
        section: usize,
        /// 段内页号
        page: usize,
        /// 是否只读
        read_only: bool,
    },
    /// 栈页与参数页，内容全零
    ZeroFill,
}

/// 进程地址空间
pub struct AddressSpace {
    pid: Pid,
    layout: Layout,
    image: Arc<dyn ProgramImage>,
    entries: SpinLock<Vec<TranslationEntry>>,
    exited: AtomicBool,
}

impl AddressSpace {
    /// 为 `image` 创建地址空间，所有表项初始无效
    pub fn new(pid: Pid, image: Arc<dyn ProgramImage>, config: &VmConfig) -> VmResult<Self> {
        let layout = Layout::for_image(image.as_ref(), config)?;
        let entries = (0..layout.num_pages())
            .map(|n| TranslationEntry::invalid(Vpn(n)))
            .collect();
        Ok(Self {
            pid,
            layout,
            image,
            entries: SpinLock::new(entries),
            exited: AtomicBool::new(false),
        })
    }

    /// 所属进程
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 页布局
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// 页数
    pub fn num_pages(&self) -> usize {
        self.layout.num_pages()
    }

    /// 程序镜像
    pub fn image(&self) -> &dyn ProgramImage {
        self.image.as_ref()
    }

    /// 查询页表项
    pub fn translate(&self, vpn: Vpn) -> VmResult<TranslationEntry> {
        self.entries
            .lock()
            .get(vpn.as_usize())
            .copied()
            .ok_or(VmError::OutOfRange)
    }

    /// 记录一次访问：置 `USED`，写访问同时置 `DIRTY`
    ///
    /// 对未驻留的页无效果。内核内部的访问经由
    /// [`FrameTable::pin_resident`](crate::FrameTable::pin_resident) 在帧表锁内完成。
    pub fn mark_accessed(&self, vpn: Vpn, is_write: bool) -> VmResult<()> {
        self.with_entry(vpn, |entry| {
            if entry.is_valid() {
                entry.touch(is_write);
            }
        })
    }

    /// 在页表锁内访问一个表项
    pub(crate) fn with_entry<R>(
        &self,
        vpn: Vpn,
        f: impl FnOnce(&mut TranslationEntry) -> R,
    ) -> VmResult<R> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(vpn.as_usize())
            .ok_or(VmError::OutOfRange)?;
        Ok(f(entry))
    }

    /// 判断一个不在交换区中的页的内容来源
    pub fn classify(&self, vpn: Vpn) -> VmResult<PageSource> {
        let n = vpn.as_usize();
        if n >= self.num_pages() {
            return Err(VmError::OutOfRange);
        }
        if n >= self.layout.section_pages {
            return Ok(PageSource::ZeroFill);
        }
        let sections = self.image.sections();
        let (index, section) = sections
            .iter()
            .enumerate()
            .find(|(_, s)| s.vpn_range().contains(&n))
            .ok_or(VmError::IllegalAccess)?;
        Ok(PageSource::Image {
            section: index,
            page: n - section.first_vpn,
            read_only: section.read_only,
        })
    }

    /// 当前驻留的页
    pub fn resident_pages(&self) -> Vec<(Vpn, Ppn)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| e.frame().map(|ppn| (e.vpn(), ppn)))
            .collect()
    }

    /// 是否已经退出
    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// 标记为已退出，返回之前是否已经退出
    pub(crate) fn mark_exited(&self) -> bool {
        self.exited.swap(true, Ordering::AcqRel)
    }
}
