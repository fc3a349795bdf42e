//! 调度器协作接口
//!
//! 睡眠锁和条件变量只依赖调度器的三个原语：当前线程标识、阻塞、唤醒。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 调度器操作的 trait
///
/// 由内核线程调度器实现并注册。
///
/// `wake` 必须具有“许可”语义：若在目标线程调用 `block_current` 之前被唤醒，
/// 那么随后的 `block_current` 必须立即返回，唤醒不能丢失。
/// 允许 `block_current` 伪唤醒，调用方负责重新检查条件。
pub trait SchedOps: Send + Sync {
    /// 当前线程的标识，在线程生命周期内唯一且稳定
    fn current_thread(&self) -> usize;

    /// 阻塞当前线程，直到被 `wake`
    fn block_current(&self);

    /// 唤醒指定线程
    fn wake(&self, tid: usize);
}

static SCHED_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static SCHED_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册调度器操作实现
///
/// # Safety
/// 必须在任何睡眠锁或条件变量被使用之前调用；重复注册同一实现是无害的
pub unsafe fn register_sched_ops(ops: &'static dyn SchedOps) {
    let ptr = ops as *const dyn SchedOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn SchedOps, (usize, usize)>(ptr) };
    SCHED_OPS_VTABLE.store(vtable, Ordering::Release);
    SCHED_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的调度器操作实现
///
/// # Panics
/// 如果尚未调用 [`register_sched_ops`] 注册实现，则 panic
#[inline]
pub fn sched_ops() -> &'static dyn SchedOps {
    let data = SCHED_OPS_DATA.load(Ordering::Acquire);
    let vtable = SCHED_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::sched::MOCK_SCHED_OPS;
        }
        #[cfg(not(test))]
        panic!("sync: SchedOps not registered, call register_sched_ops first");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn SchedOps>((data, vtable)) }
}
