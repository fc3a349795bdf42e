//! 测试支持 crate
//!
//! 为 `sync` 与 `vm` 的宿主测试提供协作者的 Mock 实现：
//! 中断控制与基于线程 park/unpark 的调度器。

pub mod mock;
