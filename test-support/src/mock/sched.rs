//! 调度器的 Mock 实现
//!
//! 每个宿主线程在第一次调用 `current_thread` 时获得一个编号，
//! 线程退出时编号随线程局部变量一起注销。
//! 阻塞与唤醒分别映射为 `thread::park` 与 `Thread::unpark`。
//! `unpark` 先于 `park` 发生时，下一次 `park` 立即返回，满足唤醒不丢失的要求。

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, Thread};

/// 编号由所有实例共享，线程局部变量只有一份
static NEXT_TID: AtomicUsize = AtomicUsize::new(1);
static THREADS: Mutex<BTreeMap<usize, Thread>> = Mutex::new(BTreeMap::new());

/// 线程局部的编号登记，析构时从表中移除
struct Registration {
    tid: Cell<usize>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let tid = self.tid.get();
        if tid == 0 {
            return;
        }
        if let Ok(mut threads) = THREADS.lock() {
            threads.remove(&tid);
        }
    }
}

thread_local! {
    static CURRENT: Registration = const { Registration { tid: Cell::new(0) } };
}

/// Mock 调度器
pub struct MockSchedOps {
    blocked: AtomicUsize,
}

impl MockSchedOps {
    pub const fn new() -> Self {
        Self {
            blocked: AtomicUsize::new(0),
        }
    }

    /// 当前线程编号，首次调用时分配
    pub fn current_thread(&self) -> usize {
        CURRENT.with(|current| {
            let tid = current.tid.get();
            if tid != 0 {
                return tid;
            }
            let tid = NEXT_TID.fetch_add(1, Ordering::Relaxed);
            THREADS.lock().unwrap().insert(tid, thread::current());
            current.tid.set(tid);
            tid
        })
    }

    /// 阻塞当前线程
    pub fn block_current(&self) {
        self.blocked.fetch_add(1, Ordering::SeqCst);
        thread::park();
    }

    /// 唤醒指定线程，已退出的线程忽略
    pub fn wake(&self, tid: usize) {
        let thread = THREADS.lock().unwrap().get(&tid).cloned();
        if let Some(thread) = thread {
            thread.unpark();
        }
    }

    /// 累计阻塞次数
    pub fn block_count(&self) -> usize {
        self.blocked.load(Ordering::SeqCst)
    }

    /// 编号对应的线程是否仍然存活
    pub fn is_registered(&self, tid: usize) -> bool {
        THREADS.lock().unwrap().contains_key(&tid)
    }
}

impl Default for MockSchedOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_SCHED_OPS: MockSchedOps = MockSchedOps::new();
