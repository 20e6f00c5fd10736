//! # 磁盘块管理器层
//!
//! 超级块记录磁盘规模，并把所有空闲数据块串成单链表：
//! 每个空闲块的前 4 字节存放下一个空闲块的编号，表尾为 `-1`。
//!
//! 分配从表头弹出；回收挂到表尾，需要从表头走到表尾，代价与链表长度成正比。

use alloc::sync::Arc;

use block_dev::BlockDevice;
use log::{debug, error, warn};

use crate::block;
use crate::layout::{read_i32, write_i32, BlockId, Directory, InodeArea, SuperBlock};
use crate::layout::{DIRECT_COUNT, MAX_FILE_SIZE};
use crate::{DataBlock, BLOCK_SIZE, DEFAULT_INODES};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Allocator {
    block_device: Arc<dyn BlockDevice>,
    total_blocks: u32,
    total_inodes: u16,
    /// 空闲块链表的表头
    free_list: Option<BlockId>,
}

impl Allocator {
    /// 读取 0 号块上的超级块。元数据与设备不符时，以默认 inode 数格式化。
    ///
    /// 返回的布尔值表示是否进行了格式化。
    pub fn mount(block_device: Arc<dyn BlockDevice>, disk_blocks: usize) -> Result<(Self, bool)> {
        let super_block = block::map(&block_device, 0, SuperBlock::decode);

        if super_block.is_valid(disk_blocks) && super_block.total_inodes <= i16::MAX as i32 {
            let allocator = Self {
                block_device,
                total_blocks: super_block.total_blocks as u32,
                total_inodes: super_block.total_inodes as u16,
                free_list: BlockId::from_link(super_block.free_list),
            };
            debug!(
                "mounted: blocks={}, inodes={}, free list head={:?}",
                allocator.total_blocks, allocator.total_inodes, allocator.free_list
            );
            return Ok((allocator, false));
        }

        warn!("no valid super block on a {disk_blocks}-block disk, formatting");
        let mut allocator = Self {
            block_device,
            total_blocks: disk_blocks as u32,
            total_inodes: 0,
            free_list: None,
        };
        allocator.format(DEFAULT_INODES)?;
        Ok((allocator, true))
    }

    /// 写入 `inodes` 个空闲 inode，并把其后所有块串成空闲链表
    pub fn format(&mut self, inodes: u16) -> Result<()> {
        let total_blocks = self.total_blocks as usize;
        if inodes == 0 || inodes as usize > i16::MAX as usize || total_blocks > BlockId::LIMIT {
            return Err(Error::InvalidArgument);
        }

        // 目录作为根文件的内容，必须放得进一个文件，也放得进数据区
        let directory_bytes = Directory::bytes_for(inodes as usize);
        let data_blocks = total_blocks.saturating_sub(1 + InodeArea::blocks_for(inodes as usize));
        if directory_bytes > MAX_FILE_SIZE || Self::blocks_for_file(directory_bytes) > data_blocks {
            warn!("{inodes} inodes: directory of {directory_bytes} bytes does not fit");
            return Err(Error::InvalidArgument);
        }

        let first_data_block = InodeArea::new(self.block_device.clone()).format(inodes as usize);

        for block_id in first_data_block..total_blocks {
            let next = if block_id + 1 < total_blocks {
                block_id as i32 + 1
            } else {
                -1
            };
            let mut data = [0; BLOCK_SIZE];
            write_i32(&mut data, 0, next);
            block::write(&self.block_device, block_id, &data);
        }

        self.total_inodes = inodes;
        self.free_list = Some(BlockId::new(first_data_block as u16));
        self.sync();

        debug!(
            "formatted: blocks={total_blocks}, inodes={inodes}, data area starts at {first_data_block}"
        );
        Ok(())
    }

    /// 把元数据写回 0 号块
    pub fn sync(&self) {
        let super_block = SuperBlock {
            total_blocks: self.total_blocks as i32,
            total_inodes: self.total_inodes as i32,
            free_list: BlockId::to_link(self.free_list),
        };
        block::map_mut(&self.block_device, 0, |data: &mut DataBlock| {
            super_block.encode(data)
        });
    }

    /// 从表头取下一个空闲块并清零；链表为空则返回空
    pub fn get_free_block(&mut self) -> Option<BlockId> {
        let Some(head) = self.free_list else {
            warn!("out of free blocks");
            return None;
        };

        let next = block::map_mut(&self.block_device, head.index(), |data: &mut DataBlock| {
            let next = read_i32(data, 0);
            data.fill(0);
            next
        });
        self.free_list = self.checked_link(next);

        Some(head)
    }

    /// 将块挂到空闲链表的表尾
    pub fn return_block(&mut self, block: BlockId) -> Result<()> {
        if !self.is_data_block(block) {
            return Err(Error::InvalidArgument);
        }

        let tail = match self.free_list {
            None => None,
            Some(head) => {
                let mut tail = head;
                let mut steps = 0;
                loop {
                    // 重复回收会让链表成环
                    if tail == block {
                        error!("block {} returned twice", block.index());
                        return Err(Error::StructuralViolation);
                    }
                    let next = block::map(&self.block_device, tail.index(), |data: &DataBlock| {
                        read_i32(data, 0)
                    });
                    match self.checked_link(next) {
                        Some(next) if steps < self.total_blocks => {
                            tail = next;
                            steps += 1;
                        }
                        _ => break Some(tail),
                    }
                }
            }
        };

        block::map_mut(&self.block_device, block.index(), |data: &mut DataBlock| {
            write_i32(data, 0, -1)
        });

        match tail {
            None => self.free_list = Some(block),
            Some(tail) => block::map_mut(&self.block_device, tail.index(), |data: &mut DataBlock| {
                write_i32(data, 0, BlockId::to_link(Some(block)))
            }),
        }

        Ok(())
    }

    /// 沿链表数出空闲块个数
    pub fn free_blocks(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_list;
        while let Some(block) = cursor {
            if count >= self.total_blocks as usize {
                error!("free list does not terminate");
                break;
            }
            count += 1;
            let next = block::map(&self.block_device, block.index(), |data: &DataBlock| {
                read_i32(data, 0)
            });
            cursor = self.checked_link(next);
        }
        count
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    #[inline]
    pub fn total_inodes(&self) -> u16 {
        self.total_inodes
    }

    #[inline]
    pub fn free_list(&self) -> Option<BlockId> {
        self.free_list
    }

    #[inline]
    pub fn first_data_block(&self) -> usize {
        1 + InodeArea::blocks_for(self.total_inodes as usize)
    }
}

impl Allocator {
    /// 存放 `bytes` 字节的文件占用的块数，含索引块
    pub(crate) fn blocks_for_file(bytes: usize) -> usize {
        let data = bytes.div_ceil(BLOCK_SIZE);
        data + usize::from(data > DIRECT_COUNT)
    }

    #[inline]
    fn is_data_block(&self, block: BlockId) -> bool {
        (self.first_data_block()..self.total_blocks as usize).contains(&block.index())
    }

    /// 解码链接；指向数据区之外的链接视为表尾
    fn checked_link(&self, raw: i32) -> Option<BlockId> {
        let next = BlockId::from_link(raw)?;
        if self.is_data_block(next) {
            Some(next)
        } else {
            error!("FS corrupted: free list links to block {raw}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RamDisk;

    fn mounted(blocks: usize) -> Allocator {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(blocks));
        let (allocator, formatted) = Allocator::mount(dev, blocks).unwrap();
        assert!(formatted);
        allocator
    }

    #[test]
    fn format_layout() {
        let allocator = mounted(1000);
        assert_eq!(1000, allocator.total_blocks());
        assert_eq!(DEFAULT_INODES, allocator.total_inodes());
        assert_eq!(5, allocator.first_data_block());
        assert_eq!(Some(BlockId::new(5)), allocator.free_list());
        assert_eq!(995, allocator.free_blocks());

        let super_block = block::map(&allocator.block_device, 0, SuperBlock::decode);
        assert_eq!(
            SuperBlock {
                total_blocks: 1000,
                total_inodes: 64,
                free_list: 5
            },
            super_block
        );
        // 最后一块是表尾
        let tail = block::map(&allocator.block_device, 999, |data: &DataBlock| {
            read_i32(data, 0)
        });
        assert_eq!(-1, tail);
    }

    #[test]
    fn pop_zeroes_block() {
        let mut allocator = mounted(16);
        let block = allocator.get_free_block().unwrap();
        assert_eq!(BlockId::new(5), block);
        assert_eq!(Some(BlockId::new(6)), allocator.free_list());
        let data = block::read(&allocator.block_device, block.index());
        assert_eq!([0; BLOCK_SIZE], data);
    }

    #[test]
    fn exhaustion_and_return() {
        let mut allocator = mounted(16);
        let blocks: Vec<BlockId> = core::iter::from_fn(|| allocator.get_free_block()).collect();
        assert_eq!(11, blocks.len());
        assert_eq!(None, allocator.get_free_block());
        assert_eq!(0, allocator.free_blocks());

        // 空链表回收后成为表头
        allocator.return_block(blocks[3]).unwrap();
        assert_eq!(Some(blocks[3]), allocator.free_list());
        allocator.return_block(blocks[7]).unwrap();
        assert_eq!(2, allocator.free_blocks());
        assert_eq!(Some(blocks[3]), allocator.get_free_block());
        assert_eq!(Some(blocks[7]), allocator.get_free_block());
        assert_eq!(None, allocator.get_free_block());
    }

    #[test]
    fn return_appends_at_tail() {
        let mut allocator = mounted(16);
        let block = allocator.get_free_block().unwrap();
        allocator.return_block(block).unwrap();
        assert_eq!(11, allocator.free_blocks());
        let last = core::iter::from_fn(|| allocator.get_free_block()).last();
        assert_eq!(Some(block), last);
    }

    #[test]
    fn bad_returns_are_rejected() {
        let mut allocator = mounted(16);
        assert_eq!(
            Err(Error::InvalidArgument),
            allocator.return_block(BlockId::new(0))
        );
        assert_eq!(
            Err(Error::InvalidArgument),
            allocator.return_block(BlockId::new(4))
        );
        assert_eq!(
            Err(Error::InvalidArgument),
            allocator.return_block(BlockId::new(16))
        );
        assert_eq!(
            Err(Error::StructuralViolation),
            allocator.return_block(BlockId::new(9))
        );
        assert_eq!(11, allocator.free_blocks());
    }

    #[test]
    fn remount_trusts_super_block() {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(64));
        let (mut allocator, _) = Allocator::mount(dev.clone(), 64).unwrap();
        allocator.format(32).unwrap();
        allocator.get_free_block().unwrap();
        allocator.sync();

        let (remounted, formatted) = Allocator::mount(dev.clone(), 64).unwrap();
        assert!(!formatted);
        assert_eq!(32, remounted.total_inodes());
        assert_eq!(Some(BlockId::new(4)), remounted.free_list());

        // 设备大小不符则重新格式化
        let (reformatted, formatted) = Allocator::mount(dev, 63).unwrap();
        assert!(formatted);
        assert_eq!(DEFAULT_INODES, reformatted.total_inodes());
        assert_eq!(58, reformatted.free_blocks());
    }

    #[test]
    fn format_rejects_bad_layouts() {
        let mut allocator = mounted(16);
        assert_eq!(Err(Error::InvalidArgument), allocator.format(0));
        // inode 区占满整个磁盘
        assert_eq!(Err(Error::InvalidArgument), allocator.format(240));
        // 剩下的数据块放不下目录
        assert_eq!(Err(Error::InvalidArgument), allocator.format(224));
        assert_eq!(Err(Error::InvalidArgument), allocator.format(81));
        // 目录恰好占满数据区
        assert_eq!(Ok(()), allocator.format(80));
        assert_eq!(10, allocator.free_blocks());
    }

    #[test]
    fn directory_must_fit_in_root_file() {
        let mut allocator = mounted(4000);
        assert_eq!(MAX_FILE_SIZE, Directory::bytes_for(2136));
        assert_eq!(Err(Error::InvalidArgument), allocator.format(3000));
        assert_eq!(Err(Error::InvalidArgument), allocator.format(2137));
        assert_eq!(DEFAULT_INODES, allocator.total_inodes());

        assert_eq!(Ok(()), allocator.format(2136));
        assert_eq!(135, allocator.first_data_block());
        assert_eq!(268, Allocator::blocks_for_file(MAX_FILE_SIZE));
    }
}
