#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* flat-fs 的整体架构，自上而下 */

// 文件系统层：open/read/write/seek 等操作的门面
mod fs;

// 打开文件表层：登记所有打开的文件句柄
mod file_table;

// 磁盘块管理器层：超级块与空闲块链表
mod allocator;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块读写层：以块为单位读改写设备
mod block;

mod error;

// 内存块设备
mod ram_disk;

pub use block_dev::BlockDevice;

pub use self::{
    allocator::Allocator,
    error::{Error, Result},
    file_table::{FileTable, FileTableEntry, OpenMode},
    fs::{DirEntry, FileSystem, Whence},
    ram_disk::RamDisk,
    layout::{BlockId, Directory, DiskInode, InodeArea, SuperBlock},
    layout::{DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_SIZE, NAME_MAX_LEN},
};

pub const BLOCK_SIZE: usize = 512;

/// 挂载时发现元数据无效，格式化所用的默认 inode 数
pub const DEFAULT_INODES: u16 = 64;

type DataBlock = [u8; BLOCK_SIZE];
