//! 程序镜像
//!
//! 可执行文件被抽象为若干按页对齐的段；
//! 缺页时按 (段, 段内页) 读取一页内容。

use alloc::string::String;
use alloc::vec::Vec;

/// 程序镜像中的一个段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// 段名
    pub name: String,
    /// 段起始虚拟页号
    pub first_vpn: usize,
    /// 段页数
    pub num_pages: usize,
    /// 段是否只读
    pub read_only: bool,
}

impl Section {
    /// 段覆盖的虚拟页号区间
    pub fn vpn_range(&self) -> core::ops::Range<usize> {
        self.first_vpn..self.first_vpn + self.num_pages
    }
}

/// 程序镜像读取接口
pub trait ProgramImage: Send + Sync {
    /// 全部段
    fn sections(&self) -> &[Section];

    /// 把第 `section` 段的第 `page` 页读入 `buf`，`buf` 长度为一页
    ///
    /// 失败时返回负的错误码
    fn load_page(&self, section: usize, page: usize, buf: &mut [u8]) -> Result<(), isize>;
}

/// 内存中的程序镜像
///
/// 段按添加顺序从第 0 页起依次排列。
#[derive(Debug, Clone)]
pub struct MemoryImage {
    page_size: usize,
    sections: Vec<Section>,
    contents: Vec<Vec<u8>>,
}

impl MemoryImage {
    /// 创建一个空镜像
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            sections: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// 追加一个段，页数按内容长度向上取整（至少一页）
    pub fn with_section(mut self, name: &str, read_only: bool, contents: &[u8]) -> Self {
        let first_vpn = self.sections.iter().map(|s| s.num_pages).sum();
        let num_pages = contents.len().div_ceil(self.page_size).max(1);
        self.push(
            Section {
                name: String::from(name),
                first_vpn,
                num_pages,
                read_only,
            },
            contents,
        );
        self
    }

    /// 追加一个位置由调用方指定的段
    pub fn with_raw_section(mut self, section: Section, contents: &[u8]) -> Self {
        self.push(section, contents);
        self
    }

    fn push(&mut self, section: Section, contents: &[u8]) {
        self.sections.push(section);
        self.contents.push(contents.to_vec());
    }
}

impl ProgramImage for MemoryImage {
    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn load_page(&self, section: usize, page: usize, buf: &mut [u8]) -> Result<(), isize> {
        let contents = self.contents.get(section).ok_or(-8isize)?;
        buf.fill(0);
        let start = page * self.page_size;
        if start < contents.len() {
            let end = (start + buf.len()).min(contents.len());
            buf[..end - start].copy_from_slice(&contents[start..end]);
        }
        Ok(())
    }
}
