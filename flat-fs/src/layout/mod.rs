//! # 磁盘数据结构层
//!
//! flat-fs 的磁盘布局：
//! 超级块 | 索引节点区域 | 数据块区域
//!
//! 所有整数均以大端序存放；块指针在 inode 与索引块中是 `i16`，
//! 在超级块与空闲链表中是 `i32`，`-1` 表示空指针。

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::{DiskInode, InodeArea};
pub use inode::{DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_SIZE};

/// 根目录的内容，也属于磁盘文件系统数据结构
mod directory;
pub use directory::{Directory, NAME_MAX_LEN};

use derive_more::{From, Into};

/// 块编号
///
/// inode 中的块指针只有 16 位，因此块编号不超过 [`i16::MAX`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct BlockId(u16);

impl BlockId {
    /// 块指针能表示的块数上限
    pub const LIMIT: usize = i16::MAX as usize + 1;

    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// 由 `i16` 块指针解码，负数即空指针
    #[inline]
    pub fn from_pointer(raw: i16) -> Option<Self> {
        (raw >= 0).then_some(Self(raw as u16))
    }

    #[inline]
    pub fn to_pointer(id: Option<Self>) -> i16 {
        id.map_or(-1, |id| id.0 as i16)
    }

    /// 由空闲链表里的 `i32` 链接解码
    #[inline]
    pub fn from_link(raw: i32) -> Option<Self> {
        (0..Self::LIMIT as i32)
            .contains(&raw)
            .then_some(Self(raw as u16))
    }

    #[inline]
    pub fn to_link(id: Option<Self>) -> i32 {
        id.map_or(-1, |id| id.0 as i32)
    }
}

#[inline]
pub(crate) fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_be_bytes(raw)
}

#[inline]
pub(crate) fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub(crate) fn read_i16(buf: &[u8], offset: usize) -> i16 {
    let mut raw = [0; 2];
    raw.copy_from_slice(&buf[offset..offset + 2]);
    i16::from_be_bytes(raw)
}

#[inline]
pub(crate) fn write_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}
