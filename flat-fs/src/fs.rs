//! # 文件系统层
//!
//! 把分配器、目录与打开文件表组合成对外的文件操作。
//!
//! ## 锁
//!
//! - 表锁 `table`：打开文件表与目录，`open`/`close`/`delete` 在其下原子完成；
//! - 表项锁：同一表项上的 `read`/`write`/`seek`/`size`/`close` 互斥；
//! - 分配器锁 `allocator`：空闲链表。
//!
//! 加锁顺序为 表项 → 分配器，表 → 分配器；持有表项锁时从不申请表锁。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use log::{debug, warn};
use spin::Mutex;

use crate::allocator::Allocator;
use crate::block;
use crate::file_table::{EntryInner, FileTable, FileTableEntry, OpenMode};
use crate::layout::{BlockId, Directory, DiskInode, InodeArea};
use crate::layout::{DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_SIZE};
use crate::{DataBlock, BLOCK_SIZE};
use crate::{Error, Result};

/// `seek` 的基准位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// 文件开头(SEEK_SET)
    Start,
    /// 当前读写指针(SEEK_CUR)
    Current,
    /// 文件末尾(SEEK_END)
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Start),
            1 => Ok(Self::Current),
            2 => Ok(Self::End),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// 目录中的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_id: u16,
    pub name: String,
    /// 磁盘上 inode 记录的文件长度
    pub size: u32,
}

#[derive(Debug)]
pub struct FileSystem {
    block_device: Arc<dyn BlockDevice>,
    inodes: Arc<InodeArea>,
    allocator: Mutex<Allocator>,
    table: Mutex<FileTable>,
}

impl FileSystem {
    /// 挂载设备，必要时先格式化；随后从根文件的内容重建目录
    pub fn mount(block_device: Arc<dyn BlockDevice>, disk_blocks: usize) -> Result<Self> {
        let (allocator, formatted) = Allocator::mount(block_device.clone(), disk_blocks)?;
        let inodes = Arc::new(InodeArea::new(block_device.clone()));
        let directory = Directory::new(allocator.total_inodes());

        let fs = Self {
            block_device,
            table: Mutex::new(FileTable::new(directory, inodes.clone())),
            inodes,
            allocator: Mutex::new(allocator),
        };

        let root = fs.open(Directory::ROOT, OpenMode::Read)?;
        let size = fs.size(&root) as usize;
        if size > 0 {
            let mut data = vec![0; size];
            let read = fs.read(&root, &mut data)?;
            if let Err(err) = fs.table.lock().directory_mut().from_bytes(&data[..read]) {
                warn!("ignoring unreadable directory: {err}");
            }
        }
        fs.close(&root)?;

        debug!("mount finished, formatted={formatted}");
        Ok(fs)
    }

    /// 以 `inodes` 个 inode 重新格式化，原有文件全部丢失
    pub fn format(&self, inodes: u16) -> Result<()> {
        let mut table = self.table.lock();
        if !table.is_empty() {
            return Err(Error::Busy);
        }

        self.allocator.lock().format(inodes)?;
        *table = FileTable::new(Directory::new(inodes), self.inodes.clone());
        Ok(())
    }

    pub fn open(&self, name: &str, mode: OpenMode) -> Result<Arc<FileTableEntry>> {
        let entry = self.table.lock().open(name, mode)?;

        match mode {
            OpenMode::Write => {
                let truncated = self.truncate(entry.inode_id(), &mut entry.lock());
                if let Err(err) = truncated {
                    self.table.lock().close(&entry)?;
                    return Err(err);
                }
            }
            OpenMode::Append => {
                let mut inner = entry.lock();
                inner.seek = inner.inode.length;
            }
            OpenMode::Read | OpenMode::ReadWrite => (),
        }

        Ok(entry)
    }

    /// 又一个描述符共享此表项
    pub fn dup(&self, entry: &Arc<FileTableEntry>) {
        let mut inner = entry.lock();
        inner.ref_count += 1;
    }

    /// 引用计数减一，归零时才从打开文件表中注销
    pub fn close(&self, entry: &Arc<FileTableEntry>) -> Result<()> {
        {
            let mut inner = entry.lock();
            if inner.ref_count == 0 {
                return Err(Error::NotFound);
            }
            inner.ref_count -= 1;
            if inner.ref_count > 0 {
                return Ok(());
            }
        }

        self.table.lock().close(entry)
    }

    pub fn size(&self, entry: &Arc<FileTableEntry>) -> u32 {
        entry.lock().inode.length
    }

    /// 从读写指针处读入 `buf`，返回读到的字节数
    pub fn read(&self, entry: &Arc<FileTableEntry>, buf: &mut [u8]) -> Result<usize> {
        if !entry.mode().readable() {
            return Err(Error::ModeViolation);
        }

        let mut inner = entry.lock();
        let length = inner.inode.length as usize;
        let mut read_size = 0;

        while read_size < buf.len() {
            let seek = inner.seek as usize;
            if seek >= length {
                break;
            }
            let Some(block) = inner.inode.translate(seek, &self.block_device) else {
                break;
            };

            // 绝对地址 % 块大小 = 块内偏移
            let offset = seek % BLOCK_SIZE;
            let block_read_size = (BLOCK_SIZE - offset)
                .min(length - seek)
                .min(buf.len() - read_size);
            let dest = &mut buf[read_size..read_size + block_read_size];

            block::map(&self.block_device, block.index(), |data: &DataBlock| {
                dest.copy_from_slice(&data[offset..offset + block_read_size]);
            });

            inner.seek += block_read_size as u32;
            read_size += block_read_size;
        }

        Ok(read_size)
    }

    /// 从读写指针处写入 `buf`，按需分配数据块与索引块。
    ///
    /// 中途分配失败时返回错误但不回滚：已写入的部分连同新长度都会保留，
    /// 读写指针停在写入结束处。
    pub fn write(&self, entry: &Arc<FileTableEntry>, buf: &[u8]) -> Result<usize> {
        if !entry.mode().writable() {
            return Err(Error::ModeViolation);
        }

        let mut inner = entry.lock();
        let mut written_size = 0;

        let outcome = loop {
            if written_size == buf.len() {
                break Ok(());
            }

            let seek = inner.seek as usize;
            let mapped = inner.inode.translate(seek, &self.block_device);
            let block = match mapped {
                Some(block) => block,
                None => match self.grow(&mut inner.inode, seek / BLOCK_SIZE) {
                    Ok(block) => block,
                    Err(err) => break Err(err),
                },
            };

            let offset = seek % BLOCK_SIZE;
            let block_write_size = (BLOCK_SIZE - offset).min(buf.len() - written_size);
            let src = &buf[written_size..written_size + block_write_size];

            block::map_mut(&self.block_device, block.index(), |data: &mut DataBlock| {
                data[offset..offset + block_write_size].copy_from_slice(src);
            });

            inner.seek += block_write_size as u32;
            written_size += block_write_size;
            if inner.seek > inner.inode.length {
                inner.inode.length = inner.seek;
            }
        };

        self.inodes.store(entry.inode_id(), &inner.inode);

        if let Err(err) = outcome {
            warn!(
                "write on inode {} aborted after {written_size} of {} bytes: {err}",
                entry.inode_id(),
                buf.len()
            );
            return Err(err);
        }
        Ok(written_size)
    }

    /// 从目录中删除文件名。数据块不回收，已打开的句柄也不受影响
    pub fn delete(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let mut table = self.table.lock();
        let inode_id = table.directory().resolve(name).ok_or(Error::NotFound)?;
        table.directory_mut().free_inode(inode_id)
    }

    /// 移动读写指针，结果被限制在 `[0, 文件长度]` 内
    pub fn seek(&self, entry: &Arc<FileTableEntry>, offset: i64, whence: Whence) -> u32 {
        let mut inner = entry.lock();
        let size = inner.inode.length as i64;

        let target = match whence {
            Whence::Start => offset,
            Whence::Current => (inner.seek as i64).saturating_add(offset),
            Whence::End => size.saturating_add(offset),
        };
        inner.seek = target.clamp(0, size) as u32;

        inner.seek
    }

    /// 把目录写入根文件，再写回超级块。
    ///
    /// 根文件会先被截断再重写。写入前先确认根文件现有的块加上空闲块足以容纳目录，
    /// 不够则直接返回 [`Error::CapacityExhausted`]，磁盘上的旧目录保持不变。
    /// 检查与写入之间若有别的句柄分配走了块，重写仍可能半途失败，旧目录随之丢失。
    pub fn sync(&self) -> Result<()> {
        let data = self.table.lock().directory().to_bytes();

        let root = self.inodes.load(0);
        let owned =
            root.data_blocks(&self.block_device).len() + usize::from(root.indirect().is_some());
        if Allocator::blocks_for_file(data.len()) > owned + self.free_blocks() {
            warn!("no room to rewrite the directory, sync skipped");
            return Err(Error::CapacityExhausted);
        }

        let root = self.open(Directory::ROOT, OpenMode::Write)?;
        let written = self.write(&root, &data);
        self.close(&root)?;
        written?;

        self.allocator.lock().sync();
        Ok(())
    }

    /// 文件是否存在
    #[inline]
    pub fn exists(&self, name: &str) -> bool {
        name == Directory::ROOT || self.table.lock().directory().resolve(name).is_some()
    }

    /// 列出所有文件，不含根目录
    pub fn list(&self) -> Vec<DirEntry> {
        let names: Vec<(u16, String)> = self.table.lock().directory().entries().collect();
        names
            .into_iter()
            .map(|(inode_id, name)| DirEntry {
                inode_id,
                name,
                size: self.inodes.load(inode_id).length,
            })
            .collect()
    }

    /// 空闲块个数
    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.allocator.lock().free_blocks()
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.allocator.lock().total_blocks()
    }

    #[inline]
    pub fn total_inodes(&self) -> u16 {
        self.allocator.lock().total_inodes()
    }

    /// 读取磁盘上的 inode 记录
    #[inline]
    pub fn inode(&self, inode_id: u16) -> DiskInode {
        self.inodes.load(inode_id)
    }
}

impl FileSystem {
    /// 为文件的第 `block_index` 块分配数据块，必要时先分配间接索引块
    fn grow(&self, inode: &mut DiskInode, block_index: usize) -> Result<BlockId> {
        if block_index >= DIRECT_COUNT + INDIRECT_COUNT {
            warn!("file would exceed {MAX_FILE_SIZE} bytes");
            return Err(Error::CapacityExhausted);
        }

        let mut allocator = self.allocator.lock();

        if block_index >= DIRECT_COUNT && inode.indirect().is_none() {
            let index_block = allocator.get_free_block().ok_or(Error::CapacityExhausted)?;
            if let Err(err) = inode.alloc_index_block(index_block, &self.block_device) {
                allocator.return_block(index_block)?;
                return Err(err);
            }
        }

        let block = allocator.get_free_block().ok_or(Error::CapacityExhausted)?;
        let grown = if block_index < DIRECT_COUNT {
            inode.grow_direct(block_index, block)
        } else {
            inode.grow_indirect(block_index, block, &self.block_device)
        };
        if let Err(err) = grown {
            allocator.return_block(block)?;
            return Err(err);
        }

        Ok(block)
    }

    /// 归还文件的全部数据块，长度与读写指针归零
    fn truncate(&self, inode_id: u16, inner: &mut EntryInner) -> Result<()> {
        let blocks = inner.inode.release_blocks(&self.block_device);
        debug!("truncating inode {inode_id}: {} blocks", blocks.len());

        let mut allocator = self.allocator.lock();
        for block in blocks {
            allocator.return_block(block)?;
        }
        drop(allocator);

        inner.inode.length = 0;
        inner.seek = 0;
        self.inodes.store(inode_id, &inner.inode);
        Ok(())
    }
}
