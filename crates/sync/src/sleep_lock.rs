//! 睡眠锁
//!
//! 获取失败的线程进入 FIFO 等待队列并阻塞，而不是自旋。
//! 释放时若队列非空，锁的所有权直接移交给队首线程，
//! 因此等待者按到达顺序获得锁，且不会被新来的线程插队。
//!
//! 睡眠锁可以在持有期间进行 I/O 或等待条件变量，
//! 但不能在持有自旋锁时获取。

use crate::raw_spin_lock::{RawSpinLock, SpinLock};
use crate::sched::sched_ops;
use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicUsize, Ordering};
use lock_api::{GuardNoSend, RawMutex};

const UNLOCKED: usize = usize::MAX;

/// 睡眠锁的原始实现。
pub struct RawSleepLock {
    /// 持有者线程标识，`UNLOCKED` 表示空闲
    owner: AtomicUsize,
    waiters: SpinLock<VecDeque<usize>>,
}

impl RawSleepLock {
    /// 创建一个空闲的睡眠锁。
    pub const fn new() -> Self {
        RawSleepLock {
            owner: AtomicUsize::new(UNLOCKED),
            waiters: SpinLock::const_new(RawSpinLock::new(), VecDeque::new()),
        }
    }

    /// 当前等待获取锁的线程数
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    /// 当前持有者是否为调用线程
    pub fn is_owned_by_current(&self) -> bool {
        self.owner.load(Ordering::Acquire) == sched_ops().current_thread()
    }
}

impl Default for RawSleepLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: owner 的修改都发生在 waiters 自旋锁内，同一时刻只有一个持有者
unsafe impl RawMutex for RawSleepLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSleepLock::new();

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        let tid = sched_ops().current_thread();
        loop {
            {
                let mut waiters = self.waiters.lock();
                let owner = self.owner.load(Ordering::Acquire);
                if owner == tid {
                    // 由 unlock 移交
                    return;
                }
                if owner == UNLOCKED && waiters.is_empty() {
                    self.owner.store(tid, Ordering::Release);
                    return;
                }
                if !waiters.contains(&tid) {
                    waiters.push_back(tid);
                }
            }
            sched_ops().block_current();
        }
    }

    fn try_lock(&self) -> bool {
        let tid = sched_ops().current_thread();
        let waiters = self.waiters.lock();
        if self.owner.load(Ordering::Acquire) == UNLOCKED && waiters.is_empty() {
            self.owner.store(tid, Ordering::Release);
            true
        } else {
            false
        }
    }

    unsafe fn unlock(&self) {
        let next = {
            let mut waiters = self.waiters.lock();
            let next = waiters.pop_front();
            self.owner.store(next.unwrap_or(UNLOCKED), Ordering::Release);
            next
        };
        if let Some(tid) = next {
            sched_ops().wake(tid);
        }
    }

    fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != UNLOCKED
    }
}

/// 提供对数据互斥访问的睡眠锁。
pub type SleepLock<T> = lock_api::Mutex<RawSleepLock, T>;

/// SleepLock 的 RAII 保护器。
pub type SleepLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSleepLock, T>;
