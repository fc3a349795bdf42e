//! 交换文件接口
//!
//! 虚拟内存管理器只需要按偏移随机读写一个文件。
//! 文件系统通过 [`SwapFs`] 在内核启动时按名称打开它。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;

/// 可随机读写的交换文件
pub trait SwapFile: Send + Sync {
    /// 从 `offset` 处读取，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 向 `offset` 处写入，返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;
}

/// 交换文件所在的文件系统
pub trait SwapFs: Send + Sync {
    /// 打开 `name`；`create` 为真时不存在则创建
    fn open(&self, name: &str, create: bool) -> Result<Arc<dyn SwapFile>, isize>;
}

/// 内存中的交换文件，写越过末尾时自动增长
#[derive(Default)]
pub struct RamSwapFile {
    data: SpinLock<Vec<u8>>,
}

impl RamSwapFile {
    /// 创建一个空文件
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前文件长度
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// 文件是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SwapFile for RamSwapFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        let data = self.data.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        let mut data = self.data.lock();
        let end = offset.checked_add(buf.len()).ok_or(-27isize)?;
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }
}

/// 内存中的文件系统，只保存交换文件
#[derive(Default)]
pub struct RamSwapFs {
    files: SpinLock<BTreeMap<String, Arc<RamSwapFile>>>,
}

impl RamSwapFs {
    /// 创建一个空文件系统
    pub fn new() -> Self {
        Self::default()
    }

    /// 按名称取得已存在的文件
    pub fn get(&self, name: &str) -> Option<Arc<RamSwapFile>> {
        self.files.lock().get(name).cloned()
    }
}

impl SwapFs for RamSwapFs {
    fn open(&self, name: &str, create: bool) -> Result<Arc<dyn SwapFile>, isize> {
        let mut files = self.files.lock();
        if let Some(file) = files.get(name) {
            return Ok(file.clone());
        }
        if !create {
            return Err(-2);
        }
        let file = Arc::new(RamSwapFile::new());
        files.insert(String::from(name), file.clone());
        Ok(file)
    }
}
