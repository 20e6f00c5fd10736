//! 内存中的块设备

use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::{DataBlock, BLOCK_SIZE};

/// 以内存充当磁盘，初始全零；进程退出即丢失
#[derive(Debug)]
pub struct RamDisk(Mutex<Vec<DataBlock>>);

impl RamDisk {
    pub fn new(blocks: usize) -> Self {
        Self(Mutex::new(vec![[0; BLOCK_SIZE]; blocks]))
    }

    /// 设备的块数
    #[inline]
    pub fn blocks(&self) -> usize {
        self.0.lock().len()
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.0.lock()[block_id]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.0.lock()[block_id].copy_from_slice(buf);
    }
}
