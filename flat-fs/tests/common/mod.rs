#![allow(dead_code)]

use std::sync::Arc;

use flat_fs::{BlockDevice, FileSystem, RamDisk};
use rand::RngCore;

pub const DISK_BLOCKS: usize = 1000;

pub fn device() -> Arc<dyn BlockDevice> {
    Arc::new(RamDisk::new(DISK_BLOCKS))
}

/// 在 `blocks` 块的新设备上挂载，按默认参数格式化
pub fn mounted(blocks: usize) -> (Arc<dyn BlockDevice>, FileSystem) {
    let disk = RamDisk::new(blocks);
    assert_eq!(blocks, disk.blocks());
    let dev: Arc<dyn BlockDevice> = Arc::new(disk);
    let fs = FileSystem::mount(dev.clone(), blocks).unwrap();
    (dev, fs)
}

/// 在新设备上挂载并以 64 个 inode 格式化
pub fn formatted() -> (Arc<dyn BlockDevice>, FileSystem) {
    let (dev, fs) = mounted(DISK_BLOCKS);
    fs.format(64).unwrap();
    (dev, fs)
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
