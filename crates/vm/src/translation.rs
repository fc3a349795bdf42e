//! 页表项
//!
//! 每个虚拟页对应一个 [`TranslationEntry`]。
//! 只有 `VALID` 置位时，表项中的物理页号才有意义，
//! 因此物理页号只能通过 [`TranslationEntry::frame`] 读取。

use crate::address::{Ppn, Vpn};
use bitflags::bitflags;

bitflags! {
    /// 页表项标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        /// 页驻留在物理帧中
        const VALID = 1 << 0;
        /// 页只读
        const READ_ONLY = 1 << 1;
        /// 自上次被时钟指针扫过后曾被访问
        const USED = 1 << 2;
        /// 驻留后曾被写入，或由交换区换入
        const DIRTY = 1 << 3;
    }
}

/// 虚拟页到物理帧的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    vpn: Vpn,
    ppn: Ppn,
    flags: PteFlags,
}

impl TranslationEntry {
    /// 创建一个无效表项
    pub const fn invalid(vpn: Vpn) -> Self {
        Self {
            vpn,
            ppn: Ppn(0),
            flags: PteFlags::empty(),
        }
    }

    /// 虚拟页号
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// 标志位
    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    /// 有效时返回所在物理帧
    pub fn frame(&self) -> Option<Ppn> {
        self.is_valid().then_some(self.ppn)
    }

    /// 是否驻留
    pub fn is_valid(&self) -> bool {
        self.flags.contains(PteFlags::VALID)
    }

    /// 是否只读
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(PteFlags::READ_ONLY)
    }

    /// 是否最近被访问
    pub fn is_used(&self) -> bool {
        self.flags.contains(PteFlags::USED)
    }

    /// 是否为脏页
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PteFlags::DIRTY)
    }

    /// 建立映射；刚装入的页视为已被访问
    pub(crate) fn install(&mut self, ppn: Ppn, read_only: bool, dirty: bool) {
        self.ppn = ppn;
        self.flags = PteFlags::VALID | PteFlags::USED;
        self.flags.set(PteFlags::READ_ONLY, read_only);
        self.flags.set(PteFlags::DIRTY, dirty);
    }

    /// 失效映射，保留 `DIRTY` 以便换出时判断是否需要写回
    pub(crate) fn invalidate(&mut self) {
        self.flags.remove(PteFlags::VALID | PteFlags::USED);
    }

    /// 恢复由 [`TranslationEntry::invalidate`] 失效的映射
    pub(crate) fn revalidate(&mut self) {
        self.flags.insert(PteFlags::VALID);
    }

    /// 记录一次访问
    pub(crate) fn touch(&mut self, is_write: bool) {
        self.flags.insert(PteFlags::USED);
        if is_write {
            self.flags.insert(PteFlags::DIRTY);
        }
    }

    /// 清除 `USED`，返回清除前的值
    pub(crate) fn take_used(&mut self) -> bool {
        let used = self.is_used();
        self.flags.remove(PteFlags::USED);
        used
    }

    /// 清空为初始状态
    pub(crate) fn reset(&mut self) {
        self.ppn = Ppn(0);
        self.flags = PteFlags::empty();
    }
}
