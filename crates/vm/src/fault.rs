//! 缺页处理
//!
//! 页的状态转换：
//!
//! ```text
//! Unmapped ──fault──▶ ResidentClean ──write──▶ ResidentDirty
//!     ▲                   │   ▲                     │
//!     │                evict  └──────fault──────┐  evict (写回交换区)
//!     │                   ▼                     │   ▼
//!     └─────────────── Unmapped              Evicted
//! ```
//!
//! 换入的页直接进入 ResidentDirty，因为它的交换槽在换入时已被归还。

use crate::address::{Ppn, Vpn};
use crate::address_space::{AddressSpace, PageSource};
use crate::error::{VmError, VmResult};
use crate::evict;
use crate::frame_table::FrameOwner;
use crate::kernel::VmKernel;
use crate::stats::VmStats;
use alloc::vec;

/// 处理 `space` 中地址 `vaddr` 上的缺页
///
/// 页已驻留时什么也不做。
pub(crate) fn handle_fault(kernel: &VmKernel, space: &AddressSpace, vaddr: usize) -> VmResult<()> {
    let vpn = kernel.config().vpn_of(vaddr);
    let _manager = kernel.manager_lock();
    if space.is_exited() {
        return Err(VmError::NoSuchProcess);
    }
    if vpn.as_usize() >= space.num_pages() {
        log::warn!("vm: {} illegal access at {:#x}", space.pid(), vaddr);
        return Err(VmError::IllegalAccess);
    }
    VmStats::bump(&kernel.stats.page_faults);
    if space.translate(vpn)?.is_valid() {
        return Ok(());
    }

    let ppn = acquire_frame(kernel)?;
    let pin = kernel.frames().pin(ppn);
    let (read_only, dirty) = match populate(kernel, space, vpn, ppn) {
        Ok(flags) => flags,
        Err(e) => {
            drop(pin);
            kernel.frames().release(ppn);
            return Err(e);
        }
    };
    let owner = FrameOwner {
        pid: space.pid(),
        vpn,
    };
    kernel
        .frames()
        .claim_with(ppn, owner, || space.with_entry(vpn, |e| e.install(ppn, read_only, dirty)))?;
    drop(pin);
    log::debug!("vm: {} {} -> {}", owner.pid, vpn, ppn);
    Ok(())
}

/// 取得一个空闲帧，必要时换出一个帧后重试一次
fn acquire_frame(kernel: &VmKernel) -> VmResult<Ppn> {
    if let Some(ppn) = kernel.frames().try_allocate() {
        return Ok(ppn);
    }
    evict::evict_one(kernel)?;
    kernel.frames().try_allocate().ok_or_else(|| {
        log::error!("vm: out of physical frames after eviction");
        VmError::OutOfMemory
    })
}

/// 填充已钉住的帧，返回 (只读, 脏)
fn populate(kernel: &VmKernel, space: &AddressSpace, vpn: Vpn, ppn: Ppn) -> VmResult<(bool, bool)> {
    let page_size = kernel.config().page_size;
    let base = kernel.frame_base(ppn);
    let source = space.classify(vpn)?;
    let read_only = matches!(source, PageSource::Image { read_only: true, .. });

    let mut buf = vec![0u8; page_size];
    if kernel.swap().swap_in(space.pid(), vpn, &mut buf)?.is_some() {
        kernel.memory().write(base, &buf);
        VmStats::bump(&kernel.stats.swap_ins);
        return Ok((read_only, true));
    }

    match source {
        PageSource::Image { section, page, .. } => {
            space
                .image()
                .load_page(section, page, &mut buf)
                .map_err(|errno| {
                    log::warn!("vm: {} failed to load {}: {}", space.pid(), vpn, errno);
                    VmError::ImageLoad
                })?;
            kernel.memory().write(base, &buf);
            VmStats::bump(&kernel.stats.image_loads);
        }
        PageSource::ZeroFill => {
            kernel.memory().fill(base, page_size, 0);
            VmStats::bump(&kernel.stats.zero_fills);
        }
    }
    Ok((read_only, false))
}
