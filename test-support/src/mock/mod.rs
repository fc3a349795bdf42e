//! Mock 实现模块
//!
//! 这里不依赖 `sync` crate（避免循环依赖）。
//! 各 crate 在测试中为这些类型实现自己的 trait。

pub mod arch;
pub mod sched;
