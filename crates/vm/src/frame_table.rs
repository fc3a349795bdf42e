//! 全局帧表模块
//!
//! 为每个物理帧记录占有者（进程号、虚拟页号）和钉住计数。
//!
//! ## 钉住
//!
//! 任何对帧内容的原始拷贝都必须在持有 [`PinGuard`] 期间进行。
//! 被钉住的帧不会被选为换出对象；`PinGuard` 在 `Drop` 时解除钉住，
//! 并唤醒等待“有帧被解除钉住”的线程（换出者和退出中的进程）。
//!
//! ## 加锁规则
//!
//! 帧表由一把自旋锁保护，每个操作只在内部短暂持有，
//! 从不跨越 I/O 或帧内容拷贝。需要同时修改页表项时，
//! 顺序为 帧表 → 进程表 → 页表。

use crate::address::{Pid, Ppn, Vpn};
use crate::address_space::AddressSpace;
use crate::error::{VmError, VmResult};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use sync::{Condvar, SpinLock, SpinLockGuard};

/// 帧的占有者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    /// 进程号
    pub pid: Pid,
    /// 虚拟页号
    pub vpn: Vpn,
}

/// 单个物理帧的记录
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameRecord {
    pub(crate) owner: Option<FrameOwner>,
    pub(crate) pins: usize,
}

/// 帧表统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// 帧总数
    pub total: usize,
    /// 已被页占有的帧数
    pub allocated: usize,
    /// 空闲帧数
    pub free: usize,
    /// 被钉住的帧数
    pub pinned: usize,
}

/// 帧表锁内的状态
pub(crate) struct FrameTableInner {
    records: Vec<FrameRecord>,
    free: VecDeque<Ppn>,
    /// 时钟指针：下一个被检查的帧
    hand: usize,
    pinned: usize,
    /// 最近一次钉住计数降为零的帧
    last_unpinned: Option<Ppn>,
}

impl FrameTableInner {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn record(&self, ppn: Ppn) -> &FrameRecord {
        &self.records[ppn.as_usize()]
    }

    pub(crate) fn pinned_count(&self) -> usize {
        self.pinned
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }

    /// 返回时钟指针所指的帧，并把指针移向下一帧
    pub(crate) fn advance_hand(&mut self) -> Ppn {
        let ppn = Ppn(self.hand);
        self.hand = (self.hand + 1) % self.records.len();
        ppn
    }

    /// 把时钟指针移到 `ppn`
    pub(crate) fn set_hand(&mut self, ppn: Ppn) {
        self.hand = ppn.as_usize();
    }

    /// 取出并清除最近一次被完全解除钉住的帧
    pub(crate) fn take_last_unpinned(&mut self) -> Option<Ppn> {
        self.last_unpinned.take()
    }

    pub(crate) fn pin(&mut self, ppn: Ppn) {
        let record = &mut self.records[ppn.as_usize()];
        record.pins += 1;
        if record.pins == 1 {
            self.pinned += 1;
        }
    }

    /// 返回该帧是否因此变为未钉住
    fn unpin(&mut self, ppn: Ppn) -> bool {
        let record = &mut self.records[ppn.as_usize()];
        assert!(record.pins > 0, "vm: 解除未被钉住的帧 {}", ppn);
        record.pins -= 1;
        if record.pins == 0 {
            self.pinned -= 1;
            self.last_unpinned = Some(ppn);
            true
        } else {
            false
        }
    }

    fn release(&mut self, ppn: Ppn) {
        let record = &mut self.records[ppn.as_usize()];
        assert_eq!(record.pins, 0, "vm: 释放被钉住的帧 {}", ppn);
        record.owner = None;
        debug_assert!(!self.free.contains(&ppn), "vm: 帧 {} 被重复释放", ppn);
        self.free.push_back(ppn);
    }
}

/// 全局帧表
pub struct FrameTable {
    inner: SpinLock<FrameTableInner>,
    unpinned: Condvar,
}

impl FrameTable {
    /// 创建包含 `num_frames` 个空闲帧的帧表
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: SpinLock::new(FrameTableInner {
                records: alloc::vec![FrameRecord::default(); num_frames],
                free: (0..num_frames).map(Ppn).collect(),
                hand: 0,
                pinned: 0,
                last_unpinned: None,
            }),
            unpinned: Condvar::new(),
        }
    }

    /// 帧总数
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 帧表是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取出一个空闲帧；帧在 [`FrameTable::claim`] 之前不属于任何页
    pub fn try_allocate(&self) -> Option<Ppn> {
        self.inner.lock().free.pop_front()
    }

    /// 记录帧的占有者
    ///
    /// # Panics
    /// 帧已被占有时 panic：同一帧不能同时映射给两个页
    pub fn claim(&self, ppn: Ppn, owner: FrameOwner) {
        self.claim_with(ppn, owner, || {});
    }

    /// 记录占有者，并在同一临界区内执行 `install`（通常是提交页表项）
    pub(crate) fn claim_with<R>(
        &self,
        ppn: Ppn,
        owner: FrameOwner,
        install: impl FnOnce() -> R,
    ) -> R {
        let mut inner = self.inner.lock();
        let record = &mut inner.records[ppn.as_usize()];
        if let Some(prev) = record.owner {
            panic!("vm: 帧 {} 已被 {:?} 占有，无法分配给 {:?}", ppn, prev, owner);
        }
        record.owner = Some(owner);
        install()
    }

    /// 清除占有者并把帧放回空闲队列
    ///
    /// # Panics
    /// 帧仍被钉住时 panic
    pub fn release(&self, ppn: Ppn) {
        self.inner.lock().release(ppn);
    }

    /// 等待帧被完全解除钉住后再释放
    pub(crate) fn release_when_unpinned(&self, ppn: Ppn) {
        let mut inner = self.inner.lock();
        while inner.record(ppn).pins > 0 {
            self.unpinned.wait(&mut inner);
        }
        inner.release(ppn);
    }

    /// 钉住一个帧，返回的 guard 在销毁时解除钉住
    pub fn pin(&self, ppn: Ppn) -> PinGuard<'_> {
        self.inner.lock().pin(ppn);
        PinGuard { table: self, ppn }
    }

    /// 接管一个已在帧表锁内计入的钉住
    pub(crate) fn adopt_pin(&self, ppn: Ppn) -> PinGuard<'_> {
        PinGuard { table: self, ppn }
    }

    /// 若 `vpn` 已驻留，则在同一临界区内钉住它所在的帧并记录这次访问
    ///
    /// 页未驻留时返回 `Ok(None)`；写只读页返回 [`VmError::ReadOnly`]。
    pub fn pin_resident(
        &self,
        space: &AddressSpace,
        vpn: Vpn,
        is_write: bool,
    ) -> VmResult<Option<PinGuard<'_>>> {
        let mut inner = self.inner.lock();
        let frame = space.with_entry(vpn, |entry| {
            let Some(ppn) = entry.frame() else {
                return Ok(None);
            };
            if is_write && entry.is_read_only() {
                return Err(VmError::ReadOnly);
            }
            entry.touch(is_write);
            Ok(Some(ppn))
        })??;
        let Some(ppn) = frame else {
            return Ok(None);
        };
        debug_assert_eq!(
            inner.record(ppn).owner,
            Some(FrameOwner {
                pid: space.pid(),
                vpn
            })
        );
        inner.pin(ppn);
        Ok(Some(PinGuard { table: self, ppn }))
    }

    fn unpin(&self, ppn: Ppn) {
        let became_unpinned = self.inner.lock().unpin(ppn);
        if became_unpinned {
            self.unpinned.notify_all();
        }
    }

    /// 帧的当前占有者
    pub fn owner(&self, ppn: Ppn) -> Option<FrameOwner> {
        self.inner.lock().record(ppn).owner
    }

    /// 帧是否被钉住
    pub fn is_pinned(&self, ppn: Ppn) -> bool {
        self.inner.lock().record(ppn).pins > 0
    }

    /// 时钟指针当前位置
    pub fn hand(&self) -> Ppn {
        Ppn(self.inner.lock().hand)
    }

    /// 统计信息
    pub fn stats(&self) -> FrameStats {
        let inner = self.inner.lock();
        FrameStats {
            total: inner.len(),
            allocated: inner.records.iter().filter(|r| r.owner.is_some()).count(),
            free: inner.free_count(),
            pinned: inner.pinned_count(),
        }
    }

    /// 所有被占有的帧及其占有者
    pub fn owned_frames(&self) -> Vec<(Ppn, FrameOwner)> {
        let inner = self.inner.lock();
        inner
            .records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.owner.map(|owner| (Ppn(i), owner)))
            .collect()
    }

    pub(crate) fn lock(&self) -> SpinLockGuard<'_, FrameTableInner> {
        self.inner.lock()
    }

    /// 释放帧表锁并等待任意帧被解除钉住
    pub(crate) fn wait_unpinned(&self, guard: &mut SpinLockGuard<'_, FrameTableInner>) {
        self.unpinned.wait(guard);
    }
}

/// 帧钉住的 RAII 保护器
///
/// 持有期间帧不会被换出或释放。
pub struct PinGuard<'a> {
    table: &'a FrameTable,
    ppn: Ppn,
}

impl PinGuard<'_> {
    /// 被钉住的帧
    pub fn ppn(&self) -> Ppn {
        self.ppn
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.table.unpin(self.ppn);
    }
}

impl core::fmt::Debug for PinGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PinGuard").field(&self.ppn).finish()
    }
}
