//! 架构相关操作的 Mock 实现
//!
//! 每个宿主线程视为一个 CPU，中断使能状态按线程保存。

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 中断使能位
const SIE: usize = 0x2;

thread_local! {
    static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Mock 架构操作
pub struct MockArchOps {
    /// 累计的关中断次数
    pub disable_count: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            disable_count: AtomicUsize::new(0),
        }
    }

    /// 关闭当前线程的“中断”，返回之前的状态
    ///
    /// # Safety
    /// 与真实实现保持一致的签名，Mock 本身没有额外要求。
    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.disable_count.fetch_add(1, Ordering::Relaxed);
        if INTERRUPTS_ENABLED.replace(false) { SIE } else { 0 }
    }

    /// 恢复当前线程的“中断”状态
    ///
    /// # Safety
    /// 与真实实现保持一致的签名，Mock 本身没有额外要求。
    pub unsafe fn restore_interrupts(&self, flags: usize) {
        INTERRUPTS_ENABLED.set(flags & SIE != 0);
    }

    pub fn interrupt_enable_bit(&self) -> usize {
        SIE
    }

    pub fn cpu_id(&self) -> usize {
        0
    }

    /// 当前线程的中断是否开启
    pub fn interrupts_enabled(&self) -> bool {
        INTERRUPTS_ENABLED.get()
    }

    /// 直接设置当前线程的中断状态
    pub fn set_interrupts_enabled(&self, enabled: bool) {
        INTERRUPTS_ENABLED.set(enabled);
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
