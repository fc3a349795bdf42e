//! 同步原语
//!
//! 向虚拟内存管理器提供基本的锁和同步原语：
//! 自旋锁、睡眠锁、条件变量以及中断保护。
//!
//! 所有锁都以 [`lock_api`] 的 `RawMutex` 形式实现，
//! 因此 [`SpinLock`] 与 [`SleepLock`] 共享同一套 guard 类型和 API。
//!
//! # 外部依赖
//!
//! 此 crate 通过两个 trait 抽象外部协作者：
//!
//! - [`ArchOps`]：中断控制，供自旋锁使用
//! - [`SchedOps`]：线程阻塞与唤醒，供睡眠锁和条件变量使用
//!
//! 使用前必须调用 [`register_arch_ops`] 与 [`register_sched_ops`] 注册实现。

#![no_std]

extern crate alloc;

mod condvar;
mod intr_guard;
mod raw_spin_lock;
mod sched;
mod sleep_lock;

pub use condvar::Condvar;
pub use intr_guard::IntrGuard;
pub use raw_spin_lock::{RawSpinLock, SpinLock, SpinLockGuard};
pub use sched::{SchedOps, register_sched_ops, sched_ops};
pub use sleep_lock::{RawSleepLock, SleepLock, SleepLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由内核实现并注册，提供中断控制和 CPU 信息
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 获取中断使能位
    fn interrupt_enable_bit(&self) -> usize;

    /// 获取当前 CPU ID
    fn cpu_id(&self) -> usize;
}

/// 全局架构操作实例（存储 fat pointer 的两个部分）
static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在其它线程使用任何锁之前调用；重复注册同一实现是无害的
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取架构操作实例
#[inline]
pub(crate) fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::arch::MOCK_ARCH_OPS;
        }
        #[cfg(not(test))]
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

#[cfg(test)]
mod test_mock {
    extern crate test_support;

    use super::{ArchOps, SchedOps};
    use test_support::mock::arch::MockArchOps;
    use test_support::mock::sched::MockSchedOps;

    impl ArchOps for MockArchOps {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            unsafe { MockArchOps::read_and_disable_interrupts(self) }
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            unsafe { MockArchOps::restore_interrupts(self, flags) }
        }

        fn interrupt_enable_bit(&self) -> usize {
            MockArchOps::interrupt_enable_bit(self)
        }

        fn cpu_id(&self) -> usize {
            MockArchOps::cpu_id(self)
        }
    }

    impl SchedOps for MockSchedOps {
        fn current_thread(&self) -> usize {
            MockSchedOps::current_thread(self)
        }

        fn block_current(&self) {
            MockSchedOps::block_current(self)
        }

        fn wake(&self, tid: usize) {
            MockSchedOps::wake(self, tid)
        }
    }
}
