//! # 打开文件表层
//!
//! 每次 `open` 都会在表中登记一个新的 [`FileTableEntry`]，
//! 表项持有 inode 的私有内存副本、读写指针与打开方式，
//! 并把磁盘上 inode 的打开计数加一。
//!
//! 表项可以被多个描述符表共享(例如 fork 出的进程)，
//! 由表项自身的引用计数决定何时真正关闭。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::str::FromStr;

use spin::{Mutex, MutexGuard};

use crate::layout::{Directory, DiskInode, InodeArea};
use crate::{Error, Result};

/// 打开方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `"r"`：只读
    Read,
    /// `"w"`：只写，打开时清空文件
    Write,
    /// `"w+"`：读写兼备，不清空
    ReadWrite,
    /// `"a"`：只写，读写指针置于文件末尾
    Append,
}

impl OpenMode {
    #[inline]
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[inline]
    pub fn writable(self) -> bool {
        self != Self::Read
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self> {
        match mode {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            "w+" => Ok(Self::ReadWrite),
            "a" => Ok(Self::Append),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// 表示一个打开的文件
#[derive(Debug)]
pub struct FileTableEntry {
    inode_id: u16,
    mode: OpenMode,
    inner: Mutex<EntryInner>,
}

#[derive(Debug)]
pub(crate) struct EntryInner {
    /// inode 的内存副本，关闭前以它为准
    pub inode: DiskInode,
    /// **文件**内的偏移量
    pub seek: u32,
    /// 共享此表项的描述符个数
    pub ref_count: u32,
}

impl FileTableEntry {
    fn new(inode: DiskInode, inode_id: u16, mode: OpenMode) -> Self {
        Self {
            inode_id,
            mode,
            inner: Mutex::new(EntryInner {
                inode,
                seek: 0,
                ref_count: 1,
            }),
        }
    }

    #[inline]
    pub fn inode_id(&self) -> u16 {
        self.inode_id
    }

    #[inline]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    #[inline]
    pub fn seek_pointer(&self) -> u32 {
        self.inner.lock().seek
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.inner.lock().ref_count
    }

    /// 表项锁：串行化同一表项上的读、写、定位与关闭
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, EntryInner> {
        self.inner.lock()
    }
}

/// 打开文件表，兼管目录
#[derive(Debug)]
pub struct FileTable {
    entries: Vec<Arc<FileTableEntry>>,
    directory: Directory,
    inodes: Arc<InodeArea>,
}

impl FileTable {
    pub fn new(directory: Directory, inodes: Arc<InodeArea>) -> Self {
        Self {
            entries: Vec::new(),
            directory,
            inodes,
        }
    }

    /// 打开文件；只读打开不存在的文件会失败，其它方式则创建之
    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<Arc<FileTableEntry>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let resolved = if name == Directory::ROOT {
            Some(0)
        } else {
            self.directory.resolve(name)
        };

        let (inode_id, mut inode) = match resolved {
            Some(inode_id) => (inode_id, self.inodes.load(inode_id)),
            None if mode == OpenMode::Read => return Err(Error::NotFound),
            None => (self.directory.alloc_inode(name)?, DiskInode::new()),
        };

        inode.open_count = inode.open_count.saturating_add(1);
        inode.flag = DiskInode::USED;
        self.inodes.store(inode_id, &inode);

        let entry = Arc::new(FileTableEntry::new(inode, inode_id, mode));
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// 注销表项，打开计数减一并写回 inode
    pub fn close(&mut self, entry: &Arc<FileTableEntry>) -> Result<()> {
        let index = self
            .entries
            .iter()
            .position(|e| Arc::ptr_eq(e, entry))
            .ok_or(Error::NotFound)?;
        self.entries.swap_remove(index);

        let mut inner = entry.lock();
        inner.inode.open_count = inner.inode.open_count.saturating_sub(1);
        self.inodes.store(entry.inode_id, &inner.inode);
        Ok(())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[inline]
    pub fn directory_mut(&mut self) -> &mut Directory {
        &mut self.directory
    }
}
