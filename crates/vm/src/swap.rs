//! 交换区
//!
//! 交换文件被划分为页大小的槽，槽 `n` 位于偏移 `n * page_size`。
//! 分配时优先复用空闲槽，没有空闲槽时才把文件扩展一页；文件从不收缩。
//!
//! 每个进程换出的页记录在 (进程号, 虚拟页号) → 槽 的映射中。
//! 页被换入后，对应的槽立即归还空闲队列。
//!
//! 整个交换区由一把睡眠锁保护，读写文件期间保持持有。

use crate::address::{Pid, SwapSlot, Vpn};
use crate::error::{VmError, VmResult};
use crate::file::SwapFile;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use sync::{SleepLock, SleepLockGuard};

struct SwapState {
    free: VecDeque<SwapSlot>,
    /// 已经分配过的槽数，槽号总是小于它
    high_water: usize,
    maps: BTreeMap<Pid, BTreeMap<Vpn, SwapSlot>>,
}

impl SwapState {
    fn allocate(&mut self) -> SwapSlot {
        self.free.pop_front().unwrap_or_else(|| {
            let slot = SwapSlot(self.high_water);
            self.high_water += 1;
            slot
        })
    }

    fn free(&mut self, slot: SwapSlot) {
        assert!(
            slot.as_usize() < self.high_water,
            "vm: 释放从未分配的交换槽 {}",
            slot
        );
        debug_assert!(!self.free.contains(&slot), "vm: 交换槽 {} 被重复释放", slot);
        self.free.push_back(slot);
    }
}

/// 交换区
pub struct SwapStore {
    file: Arc<dyn SwapFile>,
    page_size: usize,
    state: SleepLock<SwapState>,
}

impl SwapStore {
    /// 在已打开的交换文件上创建交换区
    pub fn new(file: Arc<dyn SwapFile>, page_size: usize) -> Self {
        Self {
            file,
            page_size,
            state: SleepLock::new(SwapState {
                free: VecDeque::new(),
                high_water: 0,
                maps: BTreeMap::new(),
            }),
        }
    }

    /// 分配一个槽，优先复用空闲槽
    pub fn allocate_slot(&self) -> SwapSlot {
        self.state.lock().allocate()
    }

    /// 归还一个槽
    pub fn free_slot(&self, slot: SwapSlot) {
        self.state.lock().free(slot);
    }

    /// 读取一整页
    pub fn read_slot(&self, slot: SwapSlot, buf: &mut [u8]) -> VmResult<()> {
        let _state = self.state.lock();
        self.read_locked(slot, buf)
    }

    /// 写入一整页
    pub fn write_slot(&self, slot: SwapSlot, buf: &[u8]) -> VmResult<()> {
        let _state = self.state.lock();
        self.write_locked(slot, buf)
    }

    fn read_locked(&self, slot: SwapSlot, buf: &mut [u8]) -> VmResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        match self.file.read_at(slot.as_usize() * self.page_size, buf) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(n) => {
                log::warn!("vm: short swap read on {}: {} of {} bytes", slot, n, buf.len());
                Err(VmError::SwapIo)
            }
            Err(errno) => {
                log::warn!("vm: swap read on {} failed: {}", slot, errno);
                Err(VmError::SwapIo)
            }
        }
    }

    fn write_locked(&self, slot: SwapSlot, buf: &[u8]) -> VmResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        match self.file.write_at(slot.as_usize() * self.page_size, buf) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(n) => {
                log::warn!("vm: short swap write on {}: {} of {} bytes", slot, n, buf.len());
                Err(VmError::SwapIo)
            }
            Err(errno) => {
                log::warn!("vm: swap write on {} failed: {}", slot, errno);
                Err(VmError::SwapIo)
            }
        }
    }

    /// 记录 `(pid, vpn)` 的页存放在 `slot`
    ///
    /// # Panics
    /// 该页已有记录时 panic
    pub fn record(&self, pid: Pid, vpn: Vpn, slot: SwapSlot) {
        let mut state = self.state.lock();
        Self::record_locked(&mut state, pid, vpn, slot);
    }

    fn record_locked(
        state: &mut SleepLockGuard<'_, SwapState>,
        pid: Pid,
        vpn: Vpn,
        slot: SwapSlot,
    ) {
        let prev = state.maps.entry(pid).or_default().insert(vpn, slot);
        assert!(prev.is_none(), "vm: {} {} 已在交换槽 {:?}", pid, vpn, prev);
    }

    /// `(pid, vpn)` 所在的槽
    pub fn slot_of(&self, pid: Pid, vpn: Vpn) -> Option<SwapSlot> {
        self.state.lock().maps.get(&pid)?.get(&vpn).copied()
    }

    /// 删除 `(pid, vpn)` 的记录并返回它所在的槽，槽本身不被释放
    pub fn take(&self, pid: Pid, vpn: Vpn) -> Option<SwapSlot> {
        let mut state = self.state.lock();
        Self::take_locked(&mut state, pid, vpn)
    }

    fn take_locked(
        state: &mut SleepLockGuard<'_, SwapState>,
        pid: Pid,
        vpn: Vpn,
    ) -> Option<SwapSlot> {
        let map = state.maps.get_mut(&pid)?;
        let slot = map.remove(&vpn);
        if map.is_empty() {
            state.maps.remove(&pid);
        }
        slot
    }

    /// 换出：分配槽、写入 `data` 并记录映射
    ///
    /// 写入失败时槽被归还，映射不被记录。
    pub(crate) fn swap_out(&self, pid: Pid, vpn: Vpn, data: &[u8]) -> VmResult<SwapSlot> {
        let mut state = self.state.lock();
        let slot = state.allocate();
        if let Err(e) = self.write_locked(slot, data) {
            state.free(slot);
            return Err(e);
        }
        Self::record_locked(&mut state, pid, vpn, slot);
        log::debug!("vm: swap out {} {} -> {}", pid, vpn, slot);
        Ok(slot)
    }

    /// 换入：若 `(pid, vpn)` 有记录，则读入 `buf`，删除记录并归还槽
    ///
    /// 读失败时记录保持不变。
    pub(crate) fn swap_in(&self, pid: Pid, vpn: Vpn, buf: &mut [u8]) -> VmResult<Option<SwapSlot>> {
        let mut state = self.state.lock();
        let Some(slot) = state.maps.get(&pid).and_then(|m| m.get(&vpn)).copied() else {
            return Ok(None);
        };
        self.read_locked(slot, buf)?;
        Self::take_locked(&mut state, pid, vpn);
        state.free(slot);
        log::debug!("vm: swap in {} {} <- {}", pid, vpn, slot);
        Ok(Some(slot))
    }

    /// 归还进程的所有槽，返回归还的数量
    pub fn release_process(&self, pid: Pid) -> usize {
        let mut state = self.state.lock();
        let Some(map) = state.maps.remove(&pid) else {
            return 0;
        };
        let count = map.len();
        for slot in map.into_values() {
            state.free(slot);
        }
        count
    }

    /// 已经分配过的槽数（文件以页计的长度）
    pub fn high_water(&self) -> usize {
        self.state.lock().high_water
    }

    /// 空闲槽数
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// 正在被某个进程使用的槽数
    pub fn slots_in_use(&self) -> usize {
        self.state.lock().maps.values().map(|m| m.len()).sum()
    }

    /// 检查每个槽恰好位于空闲队列或某一个进程的映射中
    ///
    /// # Panics
    /// 不满足时 panic
    pub fn check_invariants(&self) {
        let state = self.state.lock();
        let mut seen = alloc::vec![false; state.high_water];
        let in_use = state.maps.values().flat_map(|m| m.values());
        for slot in state.free.iter().chain(in_use) {
            let i = slot.as_usize();
            assert!(i < state.high_water, "vm: 交换槽 {} 超出上限", slot);
            assert!(!seen[i], "vm: 交换槽 {} 出现了两次", slot);
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s), "vm: 有交换槽丢失");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::RamSwapFile;
    use crate::tests::init;
    use alloc::vec;

    const PAGE: usize = 16;

    fn store() -> SwapStore {
        SwapStore::new(Arc::new(RamSwapFile::new()), PAGE)
    }

    #[test]
    fn test_slots_are_reused_before_growth() {
        init();
        let swap = store();
        let a = swap.allocate_slot();
        let b = swap.allocate_slot();
        assert_eq!((a, b), (SwapSlot(0), SwapSlot(1)));
        swap.free_slot(a);
        assert_eq!(swap.allocate_slot(), a);
        assert_eq!(swap.allocate_slot(), SwapSlot(2));
        assert_eq!(swap.high_water(), 3);
    }

    #[test]
    fn test_read_back_written_page() {
        init();
        let swap = store();
        let slot = swap.allocate_slot();
        swap.write_slot(slot, &[9; PAGE]).unwrap();
        let mut buf = vec![0; PAGE];
        swap.read_slot(slot, &mut buf).unwrap();
        assert_eq!(buf, [9; PAGE]);
    }

    #[test]
    fn test_reading_unwritten_slot_fails() {
        init();
        let swap = store();
        let slot = swap.allocate_slot();
        let mut buf = vec![0; PAGE];
        assert_eq!(swap.read_slot(slot, &mut buf), Err(VmError::SwapIo));
    }

    #[test]
    fn test_swap_in_frees_slot() {
        init();
        let swap = store();
        let slot = swap.swap_out(Pid(1), Vpn(3), &[5; PAGE]).unwrap();
        assert_eq!(swap.slot_of(Pid(1), Vpn(3)), Some(slot));
        assert_eq!(swap.slots_in_use(), 1);

        let mut buf = vec![0; PAGE];
        assert_eq!(swap.swap_in(Pid(1), Vpn(3), &mut buf), Ok(Some(slot)));
        assert_eq!(buf, [5; PAGE]);
        assert_eq!(swap.slot_of(Pid(1), Vpn(3)), None);
        assert_eq!(swap.free_count(), 1);
        assert_eq!(swap.swap_in(Pid(1), Vpn(3), &mut buf), Ok(None));
        swap.check_invariants();
    }

    #[test]
    fn test_release_process_returns_all_slots() {
        init();
        let swap = store();
        for vpn in 0..3 {
            swap.swap_out(Pid(7), Vpn(vpn), &[0; PAGE]).unwrap();
        }
        swap.swap_out(Pid(8), Vpn(0), &[0; PAGE]).unwrap();
        assert_eq!(swap.release_process(Pid(7)), 3);
        assert_eq!(swap.release_process(Pid(7)), 0);
        assert_eq!(swap.free_count(), 3);
        assert_eq!(swap.slots_in_use(), 1);
        swap.check_invariants();
    }

    #[test]
    fn test_take_leaves_slot_allocated() {
        init();
        let swap = store();
        let slot = swap.allocate_slot();
        swap.record(Pid(2), Vpn(0), slot);
        assert_eq!(swap.take(Pid(2), Vpn(0)), Some(slot));
        assert_eq!(swap.free_count(), 0);
        swap.free_slot(slot);
        swap.check_invariants();
    }
}
