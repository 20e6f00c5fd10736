
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::BlockDevice;
use flat_fs::BLOCK_SIZE;

/// 以镜像文件充当块设备
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// 新建(或清空)镜像文件，大小为 `blocks` 块
    pub fn create(path: impl AsRef<Path>, blocks: usize) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((blocks * BLOCK_SIZE) as u64)?;

        Ok(Self(Mutex::new(fd)))
    }

    /// 打开已有镜像，返回设备与其块数；不足一块的尾部被忽略
    pub fn open(path: impl AsRef<Path>) -> io::Result<(Self, usize)> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = fd.metadata()?.len() as usize / BLOCK_SIZE;

        Ok((Self(Mutex::new(fd)), blocks))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}
