//! 运行统计

use core::sync::atomic::{AtomicUsize, Ordering};

/// 虚拟内存事件计数器
#[derive(Debug, Default)]
pub struct VmStats {
    pub(crate) page_faults: AtomicUsize,
    pub(crate) evictions: AtomicUsize,
    pub(crate) swap_ins: AtomicUsize,
    pub(crate) swap_outs: AtomicUsize,
    pub(crate) zero_fills: AtomicUsize,
    pub(crate) image_loads: AtomicUsize,
    pub(crate) clock_steps: AtomicUsize,
}

/// [`VmStats`] 在某一时刻的快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStatsSnapshot {
    /// 进入缺页处理的次数（含页已驻留的重试）
    pub page_faults: usize,
    /// 换出的帧数
    pub evictions: usize,
    /// 从交换区换入的页数
    pub swap_ins: usize,
    /// 写回交换区的页数
    pub swap_outs: usize,
    /// 清零填充的页数
    pub zero_fills: usize,
    /// 从程序镜像载入的页数
    pub image_loads: usize,
    /// 时钟指针检查过的帧数
    pub clock_steps: usize,
}

impl VmStats {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 读取所有计数器
    pub fn snapshot(&self) -> VmStatsSnapshot {
        VmStatsSnapshot {
            page_faults: self.page_faults.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            swap_ins: self.swap_ins.load(Ordering::Relaxed),
            swap_outs: self.swap_outs.load(Ordering::Relaxed),
            zero_fills: self.zero_fills.load(Ordering::Relaxed),
            image_loads: self.image_loads.load(Ordering::Relaxed),
            clock_steps: self.clock_steps.load(Ordering::Relaxed),
        }
    }
}
