//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、U盘或一个镜像文件；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! `flat-fs` 只通过块编号访问设备，块编号是唯一的寻址方式。

#![no_std]

use core::any::Any;
use core::fmt::Debug;

/// 块设备驱动特质
///
/// 设备被假定为可靠的：无法完成的读写属于致命错误，由驱动自行 panic。
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// 将第 `block_id` 块读入 `buf`，`buf` 恰好一块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// 将 `buf` 写入第 `block_id` 块，`buf` 恰好一块大小
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
