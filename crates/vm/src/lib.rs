//! 按需调页的虚拟内存管理器
//!
//! 为每个进程维护单级页表，在缺页时把虚拟页装入物理帧；
//! 物理帧不足时按时钟（二次机会）算法换出，脏页写回交换文件。
//!
//! # 组件
//!
//! - [`AddressSpace`]：进程页表与页布局
//! - [`FrameTable`]：全局帧表，记录帧的占有者与钉住计数
//! - [`SwapStore`]：交换槽分配与 (进程, 页) → 槽 映射
//! - 缺页处理与换出：由 [`Process`] 的操作驱动
//! - [`VmKernel`]：持有上述共享状态的上下文
//!
//! # 外部协作者
//!
//! 通过 trait 与内核其它部分解耦：
//! - [`PhysMemory`]：平坦的物理内存
//! - [`ProgramImage`]：可执行文件的段
//! - [`SwapFs`] / [`SwapFile`]：交换文件
//!
//! 锁由 `sync` crate 提供，使用前必须向其注册 `ArchOps` 与 `SchedOps`。

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod evict;
mod fault;

pub mod address;
pub mod address_space;
pub mod config;
pub mod error;
pub mod file;
pub mod frame_table;
pub mod image;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod stats;
pub mod swap;
pub mod translation;

#[cfg(test)]
mod tests;

pub use address::{Pid, Ppn, SwapSlot, Vpn};
pub use address_space::{AddressSpace, Layout, PageSource};
pub use config::{SWAP_FILE_NAME, VmConfig};
pub use error::{VmError, VmResult};
pub use file::{RamSwapFile, RamSwapFs, SwapFile, SwapFs};
pub use frame_table::{FrameOwner, FrameStats, FrameTable, PinGuard};
pub use image::{MemoryImage, ProgramImage, Section};
pub use kernel::VmKernel;
pub use memory::{PhysMemory, RamMemory};
pub use process::{PagingMode, Process};
pub use stats::{VmStats, VmStatsSnapshot};
pub use swap::SwapStore;
pub use translation::{PteFlags, TranslationEntry};
