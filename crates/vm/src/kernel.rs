//! 虚拟内存管理器上下文
//!
//! [`VmKernel`] 持有全部共享状态：物理内存、帧表、交换区、
//! 管理器锁和进程表。内核启动时创建一次，以 `Arc` 共享给所有进程。
//!
//! # 加锁顺序
//!
//! 管理器锁 → 交换区锁 → 帧表锁 → 进程表锁 → 页表锁
//!
//! 管理器锁是睡眠锁，串行化缺页处理、换出和进程退出；
//! 交换区锁是睡眠锁，不会在持有任何自旋锁时获取。

use crate::address::{Pid, Ppn, Vpn};
use crate::address_space::AddressSpace;
use crate::config::{SWAP_FILE_NAME, VmConfig};
use crate::error::{VmError, VmResult};
use crate::file::{RamSwapFs, SwapFs};
use crate::frame_table::{FrameOwner, FrameTable};
use crate::image::ProgramImage;
use crate::memory::{PhysMemory, RamMemory};
use crate::process::{PagingMode, Process};
use crate::stats::{VmStats, VmStatsSnapshot};
use crate::swap::SwapStore;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::{SleepLock, SleepLockGuard, SpinLock};

/// 虚拟内存管理器
pub struct VmKernel {
    config: VmConfig,
    memory: Arc<dyn PhysMemory>,
    frames: FrameTable,
    swap: SwapStore,
    manager: SleepLock<()>,
    processes: SpinLock<BTreeMap<Pid, Arc<AddressSpace>>>,
    next_pid: AtomicUsize,
    pub(crate) stats: VmStats,
}

impl VmKernel {
    /// 创建管理器，并在 `fs` 上打开（必要时创建）交换文件
    pub fn new(
        config: VmConfig,
        memory: Arc<dyn PhysMemory>,
        fs: &dyn SwapFs,
    ) -> VmResult<Arc<Self>> {
        config.validate()?;
        if memory.size() < config.memory_size() {
            log::error!(
                "vm: physical memory has {} bytes, {} frames need {}",
                memory.size(),
                config.num_phys_pages,
                config.memory_size()
            );
            return Err(VmError::InvalidConfig);
        }
        let file = fs.open(SWAP_FILE_NAME, true).map_err(|errno| {
            log::error!("vm: cannot open {}: {}", SWAP_FILE_NAME, errno);
            VmError::SwapUnavailable
        })?;
        log::info!(
            "vm: {} frames of {:#x} bytes, swap file {}",
            config.num_phys_pages,
            config.page_size,
            SWAP_FILE_NAME
        );
        Ok(Arc::new(Self {
            config,
            memory,
            frames: FrameTable::new(config.num_phys_pages),
            swap: SwapStore::new(file, config.page_size),
            manager: SleepLock::new(()),
            processes: SpinLock::new(BTreeMap::new()),
            next_pid: AtomicUsize::new(1),
            stats: VmStats::default(),
        }))
    }

    /// 以内存数组作为物理内存和交换文件创建管理器
    pub fn with_ram(config: VmConfig) -> VmResult<Arc<Self>> {
        config.validate()?;
        let memory = Arc::new(RamMemory::new(config.memory_size()));
        Self::new(config, memory, &RamSwapFs::new())
    }

    /// 配置
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 物理内存
    pub fn memory(&self) -> &dyn PhysMemory {
        self.memory.as_ref()
    }

    /// 帧表
    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    /// 交换区
    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    /// 统计计数
    pub fn stats(&self) -> VmStatsSnapshot {
        self.stats.snapshot()
    }

    /// 以 `mode` 创建一个运行 `image` 的进程
    pub fn spawn(
        self: &Arc<Self>,
        image: Arc<dyn ProgramImage>,
        mode: PagingMode,
    ) -> VmResult<Process> {
        Process::new(self.clone(), image, mode)
    }

    /// 存活的进程数
    pub fn process_count(&self) -> usize {
        self.processes.lock().len()
    }

    /// 分配进程号并登记一个新的地址空间
    pub(crate) fn register(&self, image: Arc<dyn ProgramImage>) -> VmResult<Arc<AddressSpace>> {
        let pid = Pid(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let space = Arc::new(AddressSpace::new(pid, image, &self.config)?);
        self.processes.lock().insert(pid, space.clone());
        log::debug!("vm: {} created with {} pages", pid, space.num_pages());
        Ok(space)
    }

    /// 按进程号查找地址空间
    pub(crate) fn lookup(&self, pid: Pid) -> Option<Arc<AddressSpace>> {
        self.processes.lock().get(&pid).cloned()
    }

    pub(crate) fn manager_lock(&self) -> SleepLockGuard<'_, ()> {
        self.manager.lock()
    }

    /// 回收进程的全部帧和交换槽，并从进程表中移除
    ///
    /// 仍被钉住的帧会等到解除钉住后再回收。重复调用无效果。
    pub(crate) fn teardown(&self, space: &AddressSpace) {
        let _manager = self.manager_lock();
        if space.mark_exited() {
            return;
        }
        let pid = space.pid();
        let mut frames = 0;
        for n in 0..space.num_pages() {
            let frame = {
                let _frames = self.frames.lock();
                space.with_entry(Vpn(n), |entry| {
                    let frame = entry.frame();
                    entry.reset();
                    frame
                })
            };
            if let Ok(Some(ppn)) = frame {
                self.frames.release_when_unpinned(ppn);
                frames += 1;
            }
        }
        let slots = self.swap.release_process(pid);
        self.processes.lock().remove(&pid);
        log::debug!("vm: {} exited, released {} frames and {} swap slots", pid, frames, slots);
    }

    /// 检查帧表、页表与交换区之间的一致性
    ///
    /// # Panics
    /// 任何一条不满足时 panic
    pub fn check_invariants(&self) {
        let _manager = self.manager_lock();
        let stats = self.frames.stats();
        assert_eq!(
            stats.allocated + stats.free,
            stats.total,
            "vm: 有帧既不空闲也不属于任何页"
        );

        for (ppn, owner) in self.frames.owned_frames() {
            let Some(space) = self.lookup(owner.pid) else {
                panic!("vm: 帧 {} 属于不存在的进程 {}", ppn, owner.pid);
            };
            let entry = match space.translate(owner.vpn) {
                Ok(entry) => entry,
                Err(e) => panic!("vm: 帧 {} 的占有者 {:?} 无效: {}", ppn, owner, e),
            };
            assert_eq!(
                entry.frame(),
                Some(ppn),
                "vm: 帧 {} 与 {:?} 的页表项不一致",
                ppn,
                owner
            );
        }

        let spaces: alloc::vec::Vec<_> = self.processes.lock().values().cloned().collect();
        for space in spaces {
            let pid = space.pid();
            for (vpn, ppn) in space.resident_pages() {
                assert_eq!(
                    self.frames.owner(ppn),
                    Some(FrameOwner { pid, vpn }),
                    "vm: {} {} 映射到不属于它的帧 {}",
                    pid,
                    vpn,
                    ppn
                );
                assert!(
                    self.swap.slot_of(pid, vpn).is_none(),
                    "vm: 驻留页 {} {} 仍占有交换槽",
                    pid,
                    vpn
                );
            }
        }
        self.swap.check_invariants();
    }

    /// 物理帧 `ppn` 的起始物理地址
    pub(crate) fn frame_base(&self, ppn: Ppn) -> usize {
        self.config.paddr(ppn, 0)
    }
}
