//! 条件变量
//!
//! 可与任意 `lock_api` 互斥锁（自旋锁或睡眠锁）配合使用。
//! 等待者按 FIFO 顺序被唤醒。

use crate::raw_spin_lock::{RawSpinLock, SpinLock};
use crate::sched::sched_ops;
use alloc::collections::VecDeque;
use lock_api::{MutexGuard, RawMutex};

/// 条件变量。
///
/// `wait` 会原子地释放传入的锁并阻塞，被唤醒后重新获取锁再返回。
/// 调用方应在循环中检查条件。
pub struct Condvar {
    waiters: SpinLock<VecDeque<usize>>,
}

impl Condvar {
    /// 创建一个没有等待者的条件变量。
    pub const fn new() -> Self {
        Condvar {
            waiters: SpinLock::const_new(RawSpinLock::new(), VecDeque::new()),
        }
    }

    /// 释放 `guard` 对应的锁并阻塞当前线程，直到被通知。
    pub fn wait<R: RawMutex, T: ?Sized>(&self, guard: &mut MutexGuard<'_, R, T>) {
        let tid = sched_ops().current_thread();
        self.waiters.lock().push_back(tid);
        MutexGuard::unlocked(guard, || {
            loop {
                sched_ops().block_current();
                if !self.waiters.lock().contains(&tid) {
                    break;
                }
            }
        });
    }

    /// 唤醒最早的一个等待者，返回是否有线程被唤醒。
    pub fn notify_one(&self) -> bool {
        let next = self.waiters.lock().pop_front();
        match next {
            Some(tid) => {
                sched_ops().wake(tid);
                true
            }
            None => false,
        }
    }

    /// 唤醒所有等待者，返回被唤醒的线程数。
    pub fn notify_all(&self) -> usize {
        let woken: VecDeque<usize> = core::mem::take(&mut *self.waiters.lock());
        for &tid in &woken {
            sched_ops().wake(tid);
        }
        woken.len()
    }

    /// 当前等待者数量
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
