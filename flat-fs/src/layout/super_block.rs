use crate::layout::{read_i32, write_i32};
use crate::DataBlock;

/// 超级块，位于 0 号块：
/// - 记录磁盘规模与 inode 数；
/// - 记录空闲块链表的表头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// 文件系统占据块数
    pub total_blocks: i32,
    pub total_inodes: i32,
    /// 空闲块链表的表头，`-1` 表示已无空闲块
    pub free_list: i32,
}

impl SuperBlock {
    pub fn decode(data: &DataBlock) -> Self {
        Self {
            total_blocks: read_i32(data, 0),
            total_inodes: read_i32(data, 4),
            free_list: read_i32(data, 8),
        }
    }

    /// 只覆盖前 12 字节，块的其余部分不使用
    pub fn encode(&self, data: &mut DataBlock) {
        write_i32(data, 0, self.total_blocks);
        write_i32(data, 4, self.total_inodes);
        write_i32(data, 8, self.free_list);
    }

    /// 块数与设备相符、有 inode、空闲链表表头越过了超级块与首个 inode 块
    #[inline]
    pub fn is_valid(&self, disk_blocks: usize) -> bool {
        self.total_blocks as usize == disk_blocks && self.total_inodes > 0 && self.free_list >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn layout() {
        let sb = SuperBlock {
            total_blocks: 1000,
            total_inodes: 64,
            free_list: 5,
        };
        let mut data = [0xaa; BLOCK_SIZE];
        sb.encode(&mut data);

        assert_eq!([0, 0, 0x03, 0xe8], data[..4]);
        assert_eq!([0, 0, 0, 64], data[4..8]);
        assert_eq!([0, 0, 0, 5], data[8..12]);
        assert_eq!(0xaa, data[12]);
        assert_eq!(sb, SuperBlock::decode(&data));
    }

    #[test]
    fn validity() {
        let sb = SuperBlock {
            total_blocks: 1000,
            total_inodes: 64,
            free_list: 5,
        };
        assert!(sb.is_valid(1000));
        assert!(!sb.is_valid(999));
        assert!(!SuperBlock { total_inodes: 0, ..sb }.is_valid(1000));
        assert!(!SuperBlock { free_list: -1, ..sb }.is_valid(1000));
        assert!(!SuperBlock::decode(&[0; BLOCK_SIZE]).is_valid(1000));
    }
}
