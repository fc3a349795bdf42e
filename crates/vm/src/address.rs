//! 编号类型
//!
//! 虚拟页号、物理页号、交换槽号与进程号都是 `usize` 的新类型，
//! 避免在接口中把它们互相混用。

/// `impl_index!` 宏
/// ---------------------
/// 为 `usize` 新类型实现与 `usize` 的互相转换和格式化。
macro_rules! impl_index {
    ($type:ident, $prefix:literal) => {
        impl $type {
            /// 转换为 `usize`
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// 下一个编号
            #[inline]
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl From<usize> for $type {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }

        impl From<$type> for usize {
            fn from(value: $type) -> Self {
                value.0
            }
        }

        impl core::fmt::Display for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

/// 虚拟页号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Vpn(pub usize);
impl_index!(Vpn, "vpn#");

/// 物理页号（帧号）
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Ppn(pub usize);
impl_index!(Ppn, "ppn#");

/// 交换文件中的槽号，槽 `n` 位于文件偏移 `n * page_size`
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SwapSlot(pub usize);
impl_index!(SwapSlot, "slot#");

/// 进程号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pid(pub usize);
impl_index!(Pid, "pid#");
