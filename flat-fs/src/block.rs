//! # 块读写层
//!
//! 设备只接受整块读写，修改块内的一部分就得先读出整块、改完再写回。
//! 这里不做缓存：每次 [`map`] 都会读设备，每次 [`map_mut`] 都会写回。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::DataBlock;
use crate::BLOCK_SIZE;

#[inline]
pub fn read(block_device: &Arc<dyn BlockDevice>, block_id: usize) -> DataBlock {
    let mut data = [0; BLOCK_SIZE];
    block_device.read_block(block_id, &mut data);
    data
}

#[inline]
pub fn write(block_device: &Arc<dyn BlockDevice>, block_id: usize, data: &DataBlock) {
    block_device.write_block(block_id, data);
}

/// 读出一块并处理
#[inline]
pub fn map<V>(
    block_device: &Arc<dyn BlockDevice>,
    block_id: usize,
    f: impl FnOnce(&DataBlock) -> V,
) -> V {
    f(&read(block_device, block_id))
}

/// 读出一块，修改后写回
pub fn map_mut<V>(
    block_device: &Arc<dyn BlockDevice>,
    block_id: usize,
    f: impl FnOnce(&mut DataBlock) -> V,
) -> V {
    let mut data = read(block_device, block_id);
    let v = f(&mut data);
    write(block_device, block_id, &data);
    v
}
