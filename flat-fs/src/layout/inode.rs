//! 磁盘上的 inode
//!
//! 每个 inode 恒为 32 字节，一块存放 16 个：
//!
//! | 偏移 | 类型        | 字段                    |
//! |------|-------------|-------------------------|
//! | 0    | `i32`       | 文件长度                |
//! | 4    | `i16`       | 打开计数                |
//! | 6    | `i16`       | 标志(0 空闲, 1 使用中)  |
//! | 8    | `[i16; 11]` | 直接索引                |
//! | 30   | `i16`       | 一级间接索引块          |
//!
//! 间接索引块：整个块连续存储 `BLOCK_SIZE / 2` 个 `i16` **块编号**，
//! 每个编号都指向一个**数据块**，未分配的为 `-1`。
//!
//! 直接索引与间接索引都只能按顺序增长，中间不能留空。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use log::debug;
use spin::Mutex;

use crate::block;
use crate::layout::{read_i16, read_i32, write_i16, write_i32, BlockId};
use crate::{Error, Result};
use crate::{DataBlock, BLOCK_SIZE};

/// 直接索引块可编号数量
pub const DIRECT_COUNT: usize = 11;
/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / 2;
/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = (DIRECT_COUNT + INDIRECT_COUNT) * BLOCK_SIZE;

const INODE_SIZE: usize = 32;
const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 文件长度(字节)
    pub length: u32,
    /// 指向此 inode 的打开文件表项个数
    pub open_count: u16,
    pub flag: u16,
    /// 直接索引，存储容量：DIRECT_COUNT * BLOCK_SIZE 字节
    direct: [Option<BlockId>; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect: Option<BlockId>,
}

impl DiskInode {
    pub const UNUSED: u16 = 0;
    pub const USED: u16 = 1;

    /// 新建文件所用的 inode
    #[inline]
    pub fn new() -> Self {
        Self {
            length: 0,
            open_count: 0,
            flag: Self::USED,
            direct: [None; DIRECT_COUNT],
            indirect: None,
        }
    }

    /// 格式化时写入的空闲 inode
    #[inline]
    pub fn unused() -> Self {
        Self {
            flag: Self::UNUSED,
            ..Self::new()
        }
    }

    pub fn decode(raw: &[u8]) -> Self {
        let mut direct = [None; DIRECT_COUNT];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = BlockId::from_pointer(read_i16(raw, 8 + i * 2));
        }

        Self {
            length: read_i32(raw, 0) as u32,
            open_count: read_i16(raw, 4) as u16,
            flag: read_i16(raw, 6) as u16,
            direct,
            indirect: BlockId::from_pointer(read_i16(raw, 30)),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        write_i32(raw, 0, self.length as i32);
        write_i16(raw, 4, self.open_count as i16);
        write_i16(raw, 6, self.flag as i16);
        for (i, &slot) in self.direct.iter().enumerate() {
            write_i16(raw, 8 + i * 2, BlockId::to_pointer(slot));
        }
        write_i16(raw, 30, BlockId::to_pointer(self.indirect));
    }

    #[inline]
    pub fn direct(&self) -> &[Option<BlockId>; DIRECT_COUNT] {
        &self.direct
    }

    #[inline]
    pub fn indirect(&self) -> Option<BlockId> {
        self.indirect
    }

    /// 将文件内的字节偏移翻译为数据块编号，尚未分配则返回空
    pub fn translate(&self, offset: usize, block_device: &Arc<dyn BlockDevice>) -> Option<BlockId> {
        let block_index = offset / BLOCK_SIZE;

        if block_index < DIRECT_COUNT {
            return self.direct[block_index];
        }

        // 剔去直接索引的部分
        let slot = block_index - DIRECT_COUNT;
        if slot >= INDIRECT_COUNT {
            return None;
        }

        let indirect = self.indirect?;
        block::map(block_device, indirect.index(), |index_block: &DataBlock| {
            BlockId::from_pointer(read_i16(index_block, slot * 2))
        })
    }

    /// 在第 `block_index` 个直接索引处挂上新块
    pub fn grow_direct(&mut self, block_index: usize, block: BlockId) -> Result<()> {
        if block_index >= DIRECT_COUNT
            || self.direct[block_index].is_some()
            || (block_index > 0 && self.direct[block_index - 1].is_none())
        {
            return Err(Error::StructuralViolation);
        }

        self.direct[block_index] = Some(block);
        Ok(())
    }

    /// 直接索引全部用完后，启用 `block` 作为间接索引块
    pub fn alloc_index_block(
        &mut self,
        block: BlockId,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<()> {
        if self.indirect.is_some() || self.direct.iter().any(Option::is_none) {
            return Err(Error::StructuralViolation);
        }

        // 仅在分配时清空一次，之后靠 `-1` 标记空槽
        block::write(block_device, block.index(), &[0xff; BLOCK_SIZE]);
        self.indirect = Some(block);
        debug!("index block {} allocated", block.index());
        Ok(())
    }

    /// 在文件的第 `block_index` 块(位于间接索引内)处挂上新块
    pub fn grow_indirect(
        &mut self,
        block_index: usize,
        block: BlockId,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<()> {
        let Some(indirect) = self.indirect else {
            return Err(Error::StructuralViolation);
        };
        if block_index < DIRECT_COUNT {
            return Err(Error::StructuralViolation);
        }
        let slot = block_index - DIRECT_COUNT;
        if slot >= INDIRECT_COUNT {
            return Err(Error::CapacityExhausted);
        }

        block::map_mut(block_device, indirect.index(), |index_block: &mut DataBlock| {
            let occupied = read_i16(index_block, slot * 2) >= 0;
            let gap = slot > 0 && read_i16(index_block, (slot - 1) * 2) < 0;
            if occupied || gap {
                return Err(Error::StructuralViolation);
            }
            write_i16(index_block, slot * 2, BlockId::to_pointer(Some(block)));
            Ok(())
        })
    }

    /// 按文件内顺序列出所有已挂上的数据块，不含间接索引块本身
    pub fn data_blocks(&self, block_device: &Arc<dyn BlockDevice>) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self.direct.iter().map_while(|&slot| slot).collect();

        if let Some(indirect) = self.indirect {
            block::map(block_device, indirect.index(), |index_block: &DataBlock| {
                blocks.extend(
                    (0..INDIRECT_COUNT)
                        .map_while(|slot| BlockId::from_pointer(read_i16(index_block, slot * 2))),
                );
            });
        }

        blocks
    }

    /// 摘下所有数据块并返回它们，由调用者交还给分配器。
    /// 间接索引块保留，其中的槽全部重置为 `-1`。
    pub fn release_blocks(&mut self, block_device: &Arc<dyn BlockDevice>) -> Vec<BlockId> {
        let blocks = self.data_blocks(block_device);
        self.direct = [None; DIRECT_COUNT];

        if let Some(indirect) = self.indirect {
            if blocks.len() > DIRECT_COUNT {
                block::map_mut(block_device, indirect.index(), |index_block: &mut DataBlock| {
                    index_block[..(blocks.len() - DIRECT_COUNT) * 2].fill(0xff);
                });
            }
        }

        blocks
    }
}

impl Default for DiskInode {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// 索引节点区域：0 号块之后紧挨着的若干块。
///
/// 同一块里有 16 个 inode，写回一个 inode 就得读改写整块，
/// 所以这里的读写由一把锁串行化。
#[derive(Debug)]
pub struct InodeArea {
    block_device: Arc<dyn BlockDevice>,
    lock: Mutex<()>,
}

impl InodeArea {
    #[inline]
    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            lock: Mutex::new(()),
        }
    }

    /// 容纳 `inodes` 个 inode 需要多少块
    #[inline]
    pub fn blocks_for(inodes: usize) -> usize {
        (inodes * INODE_SIZE).div_ceil(BLOCK_SIZE)
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    #[inline]
    pub fn position(inode_id: u16) -> (usize, usize) {
        let inode_id = inode_id as usize;
        (
            1 + inode_id / INODES_PER_BLOCK,
            inode_id % INODES_PER_BLOCK * INODE_SIZE,
        )
    }

    pub fn load(&self, inode_id: u16) -> DiskInode {
        let (block_id, offset) = Self::position(inode_id);
        let _guard = self.lock.lock();
        block::map(&self.block_device, block_id, |data: &DataBlock| {
            DiskInode::decode(&data[offset..offset + INODE_SIZE])
        })
    }

    pub fn store(&self, inode_id: u16, inode: &DiskInode) {
        let (block_id, offset) = Self::position(inode_id);
        let _guard = self.lock.lock();
        block::map_mut(&self.block_device, block_id, |data: &mut DataBlock| {
            inode.encode(&mut data[offset..offset + INODE_SIZE])
        });
    }

    /// 把前 `inodes` 个 inode 全部写成空闲，返回首个数据块的编号
    pub fn format(&self, inodes: usize) -> usize {
        let blocks = Self::blocks_for(inodes);
        let unused = DiskInode::unused();
        let _guard = self.lock.lock();

        for block_index in 0..blocks {
            let mut data = [0; BLOCK_SIZE];
            let in_block = (inodes - block_index * INODES_PER_BLOCK).min(INODES_PER_BLOCK);
            for raw in data.chunks_exact_mut(INODE_SIZE).take(in_block) {
                unused.encode(raw);
            }
            block::write(&self.block_device, 1 + block_index, &data);
        }

        1 + blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RamDisk;

    fn device() -> Arc<dyn BlockDevice> {
        Arc::new(RamDisk::new(64))
    }

    fn full_direct() -> DiskInode {
        let mut inode = DiskInode::new();
        for i in 0..DIRECT_COUNT {
            inode.grow_direct(i, BlockId::new(10 + i as u16)).unwrap();
        }
        inode
    }

    #[test]
    fn record_layout() {
        let mut inode = DiskInode::new();
        inode.length = 1000;
        inode.open_count = 2;
        inode.grow_direct(0, BlockId::new(5)).unwrap();
        inode.grow_direct(1, BlockId::new(0x0102)).unwrap();

        let mut raw = [0u8; INODE_SIZE];
        inode.encode(&mut raw);
        assert_eq!([0, 0, 0x03, 0xe8, 0, 2, 0, 1, 0, 5, 1, 2, 0xff, 0xff], raw[..14]);
        assert_eq!([0xff, 0xff], raw[30..]);
        assert_eq!(inode, DiskInode::decode(&raw));
    }

    #[test]
    fn store_then_load() {
        let dev = device();
        let area = InodeArea::new(dev.clone());
        area.format(40);

        let mut inode = full_direct();
        inode.length = (DIRECT_COUNT * BLOCK_SIZE) as u32;
        inode.open_count = 3;
        inode.alloc_index_block(BlockId::new(40), &dev).unwrap();

        area.store(17, &inode);
        assert_eq!(inode, area.load(17));
        // 同块的邻居不受影响
        assert_eq!(DiskInode::unused(), area.load(16));
        assert_eq!(DiskInode::unused(), area.load(18));
        assert_eq!((2, 32), InodeArea::position(17));
    }

    #[test]
    fn format_area() {
        let dev = device();
        let area = InodeArea::new(dev);
        assert_eq!(5, area.format(64));
        assert_eq!(4, InodeArea::blocks_for(64));
        assert_eq!(2, InodeArea::blocks_for(17));
        let inode = area.load(63);
        assert_eq!(DiskInode::UNUSED, inode.flag);
        assert!(inode.direct().iter().all(Option::is_none));
        assert_eq!(None, inode.indirect());
    }

    #[test]
    fn direct_growth_is_sequential() {
        let mut inode = DiskInode::new();
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.grow_direct(1, BlockId::new(9))
        );
        inode.grow_direct(0, BlockId::new(9)).unwrap();
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.grow_direct(0, BlockId::new(10))
        );
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.grow_direct(DIRECT_COUNT, BlockId::new(10))
        );
        inode.grow_direct(1, BlockId::new(10)).unwrap();
        assert_eq!(Some(BlockId::new(10)), inode.direct()[1]);
        assert_eq!(None, inode.direct()[2]);
    }

    #[test]
    fn index_block_rules() {
        let dev = device();
        let mut inode = DiskInode::new();
        inode.grow_direct(0, BlockId::new(9)).unwrap();
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.alloc_index_block(BlockId::new(30), &dev)
        );

        let mut inode = full_direct();
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.grow_indirect(DIRECT_COUNT, BlockId::new(31), &dev)
        );
        dev.write_block(30, &[0x11; BLOCK_SIZE]);
        inode.alloc_index_block(BlockId::new(30), &dev).unwrap();
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.alloc_index_block(BlockId::new(32), &dev)
        );

        // 新索引块全部为 -1
        assert_eq!(None, inode.translate(DIRECT_COUNT * BLOCK_SIZE, &dev));
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.grow_indirect(DIRECT_COUNT + 1, BlockId::new(31), &dev)
        );
        inode
            .grow_indirect(DIRECT_COUNT, BlockId::new(31), &dev)
            .unwrap();
        assert_eq!(
            Err(Error::StructuralViolation),
            inode.grow_indirect(DIRECT_COUNT, BlockId::new(33), &dev)
        );
        assert_eq!(
            Err(Error::CapacityExhausted),
            inode.grow_indirect(DIRECT_COUNT + INDIRECT_COUNT, BlockId::new(33), &dev)
        );
    }

    #[test]
    fn translate_offsets() {
        let dev = device();
        let mut inode = full_direct();
        assert_eq!(Some(BlockId::new(10)), inode.translate(0, &dev));
        assert_eq!(Some(BlockId::new(10)), inode.translate(BLOCK_SIZE - 1, &dev));
        assert_eq!(Some(BlockId::new(11)), inode.translate(BLOCK_SIZE, &dev));
        assert_eq!(
            Some(BlockId::new(20)),
            inode.translate(DIRECT_COUNT * BLOCK_SIZE - 1, &dev)
        );
        assert_eq!(None, inode.translate(DIRECT_COUNT * BLOCK_SIZE, &dev));

        inode.alloc_index_block(BlockId::new(40), &dev).unwrap();
        inode
            .grow_indirect(DIRECT_COUNT, BlockId::new(41), &dev)
            .unwrap();
        assert_eq!(
            Some(BlockId::new(41)),
            inode.translate(DIRECT_COUNT * BLOCK_SIZE + 7, &dev)
        );
        assert_eq!(None, inode.translate(MAX_FILE_SIZE, &dev));
    }

    #[test]
    fn release_keeps_index_block() {
        let dev = device();
        let mut inode = full_direct();
        inode.alloc_index_block(BlockId::new(40), &dev).unwrap();
        inode
            .grow_indirect(DIRECT_COUNT, BlockId::new(41), &dev)
            .unwrap();
        inode
            .grow_indirect(DIRECT_COUNT + 1, BlockId::new(42), &dev)
            .unwrap();

        let blocks = inode.release_blocks(&dev);
        let expected: Vec<BlockId> = (10..21).chain([41, 42]).map(BlockId::new).collect();
        assert_eq!(expected, blocks);
        assert!(inode.direct().iter().all(Option::is_none));
        assert_eq!(Some(BlockId::new(40)), inode.indirect());
        assert!(inode.data_blocks(&dev).is_empty());

        // 重新增长时复用原索引块
        let mut inode = full_direct();
        inode.indirect = Some(BlockId::new(40));
        inode
            .grow_indirect(DIRECT_COUNT, BlockId::new(43), &dev)
            .unwrap();
        assert_eq!(
            Some(BlockId::new(43)),
            inode.translate(DIRECT_COUNT * BLOCK_SIZE, &dev)
        );
    }
}
