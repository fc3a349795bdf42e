//! 虚拟内存错误类型
//!
//! 错误只影响出错的进程；破坏全局表一致性的情况（例如同一帧被两个页表项占有）
//! 属于内核 bug，直接 panic，不经过此类型。

/// 虚拟内存操作错误
///
/// 各错误码对应标准 POSIX errno 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 地址不属于进程的任何区域 (-EFAULT)
    IllegalAccess,
    /// 虚拟页号超出页表范围 (-EFAULT)
    OutOfRange,
    /// 写只读页 (-EFAULT)
    ReadOnly,
    /// 换出之后仍无可用物理帧 (-ENOMEM)
    OutOfMemory,
    /// 交换文件读写失败 (-EIO)
    SwapIo,
    /// 程序镜像读取失败 (-ENOEXEC)
    ImageLoad,
    /// 程序段不是从第 0 页开始连续排列 (-ENOEXEC)
    FragmentedImage,
    /// 配置非法 (-EINVAL)
    InvalidConfig,
    /// 无法打开交换文件 (-EIO)
    SwapUnavailable,
    /// 进程不存在或已退出 (-ESRCH)
    NoSuchProcess,
}

impl VmError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            VmError::NoSuchProcess => -3,
            VmError::SwapIo | VmError::SwapUnavailable => -5,
            VmError::ImageLoad | VmError::FragmentedImage => -8,
            VmError::OutOfMemory => -12,
            VmError::IllegalAccess | VmError::OutOfRange | VmError::ReadOnly => -14,
            VmError::InvalidConfig => -22,
        }
    }

    /// 该错误发生在缺页处理中时是否需要终止进程
    pub fn is_fatal_to_process(&self) -> bool {
        !matches!(self, VmError::InvalidConfig | VmError::SwapUnavailable)
    }
}

impl core::fmt::Display for VmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            VmError::IllegalAccess => "illegal memory access",
            VmError::OutOfRange => "virtual page out of range",
            VmError::ReadOnly => "write to read-only page",
            VmError::OutOfMemory => "out of physical memory",
            VmError::SwapIo => "swap I/O failed",
            VmError::ImageLoad => "failed to load program image",
            VmError::FragmentedImage => "fragmented executable",
            VmError::InvalidConfig => "invalid vm configuration",
            VmError::SwapUnavailable => "swap file unavailable",
            VmError::NoSuchProcess => "no such process",
        };
        f.write_str(msg)
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
