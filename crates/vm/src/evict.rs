//! 时钟（二次机会）换出
//!
//! 时钟指针在所有物理帧上循环移动，从上一个被换出帧的下一帧开始：
//!
//! - 被钉住的帧不会被换出；指针经过时同样清除它的 `USED`
//! - `USED` 置位的帧清除 `USED` 后跳过（第二次机会）
//! - 第一个未被钉住且 `USED` 为零的帧成为换出对象
//!
//! 若连续一整圈的帧都被钉住（或无主），指针停回这一圈第一个被跳过的帧，
//! 换出者在帧表的条件变量上等待。被唤醒后直接从刚被解除钉住的帧继续，
//! 不再重新经过这一圈已经跳过的帧；伪唤醒时则从停下的位置继续。
//!
//! 换出对象在帧表锁内被失效并钉住；脏页恰好写回交换区一次，
//! 写回完成之后帧才被释放。写回失败时恢复原映射。

use crate::address::SwapSlot;
use crate::address_space::AddressSpace;
use crate::error::{VmError, VmResult};
use crate::frame_table::{FrameOwner, PinGuard};
use crate::kernel::VmKernel;
use crate::stats::VmStats;
use alloc::sync::Arc;
use alloc::vec;

struct Victim<'a> {
    pin: PinGuard<'a>,
    owner: FrameOwner,
    space: Arc<AddressSpace>,
    dirty: bool,
}

/// 换出一个帧并放回空闲队列
///
/// 返回 `Ok(false)` 表示扫描时发现已有空闲帧，没有换出任何页。
/// 调用方必须持有管理器锁。
pub(crate) fn evict_one(kernel: &VmKernel) -> VmResult<bool> {
    let Some(victim) = select_victim(kernel)? else {
        return Ok(false);
    };
    let ppn = victim.pin.ppn();
    let FrameOwner { pid, vpn } = victim.owner;
    log::debug!("vm: evicting {} {} from {} (dirty: {})", pid, vpn, ppn, victim.dirty);

    if victim.dirty {
        if let Err(e) = write_back(kernel, &victim) {
            log::warn!("vm: write-back of {} {} failed, keeping it resident", pid, vpn);
            let frames = kernel.frames().lock();
            let _ = victim.space.with_entry(vpn, |entry| entry.revalidate());
            drop(frames);
            return Err(e);
        }
        VmStats::bump(&kernel.stats.swap_outs);
    }

    drop(victim.pin);
    kernel.frames().release(ppn);
    VmStats::bump(&kernel.stats.evictions);
    Ok(true)
}

fn write_back(kernel: &VmKernel, victim: &Victim<'_>) -> VmResult<SwapSlot> {
    let mut buf = vec![0u8; kernel.config().page_size];
    kernel
        .memory()
        .read(kernel.frame_base(victim.pin.ppn()), &mut buf);
    kernel
        .swap()
        .swap_out(victim.owner.pid, victim.owner.vpn, &buf)
}

fn select_victim(kernel: &VmKernel) -> VmResult<Option<Victim<'_>>> {
    let frames = kernel.frames();
    let mut inner = frames.lock();
    let n = inner.len();
    // 连续跳过的帧数；达到 n 时指针恰好回到这一圈的起点
    let mut skipped = 0;
    loop {
        if skipped == n {
            if inner.free_count() > 0 {
                return Ok(None);
            }
            if inner.pinned_count() == 0 {
                log::error!("vm: no evictable frame among {}", n);
                return Err(VmError::OutOfMemory);
            }
            log::warn!("vm: all {} frames pinned, waiting for an unpin", inner.pinned_count());
            inner.take_last_unpinned();
            frames.wait_unpinned(&mut inner);
            if let Some(ppn) = inner.take_last_unpinned() {
                inner.set_hand(ppn);
            }
            skipped = 0;
            continue;
        }

        let ppn = inner.advance_hand();
        VmStats::bump(&kernel.stats.clock_steps);
        let record = *inner.record(ppn);
        let Some(owner) = record.owner else {
            skipped += 1;
            continue;
        };
        if record.pins > 0 {
            if let Some(space) = kernel.lookup(owner.pid) {
                let _ = space.with_entry(owner.vpn, |entry| {
                    if entry.frame() == Some(ppn) {
                        entry.take_used();
                    }
                });
            }
            skipped += 1;
            continue;
        }
        skipped = 0;

        let Some(space) = kernel.lookup(owner.pid) else {
            panic!("vm: 帧 {} 属于不存在的进程 {}", ppn, owner.pid);
        };
        let decision = space.with_entry(owner.vpn, |entry| {
            assert_eq!(entry.frame(), Some(ppn), "vm: 帧 {} 与 {:?} 不一致", ppn, owner);
            if entry.take_used() {
                None
            } else {
                entry.invalidate();
                Some(entry.is_dirty())
            }
        });
        match decision {
            Ok(Some(dirty)) => {
                inner.pin(ppn);
                drop(inner);
                return Ok(Some(Victim {
                    pin: frames.adopt_pin(ppn),
                    owner,
                    space,
                    dirty,
                }));
            }
            Ok(None) => log::trace!("vm: second chance for {} {}", owner.pid, owner.vpn),
            Err(e) => panic!("vm: 帧 {} 的占有者 {:?} 无效: {}", ppn, owner, e),
        }
    }
}
