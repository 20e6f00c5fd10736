//! 平坦目录：文件名到 inode 号的映射表
//!
//! 目录以两个定长数组保存，下标即 inode 号：
//! 名字长度 `sizes` 与名字 `names`。长度为 0 的槽位是空闲的。
//! 0 号永远是根目录 `"/"`。
//!
//! 目录本身作为 0 号 inode 的文件内容存放在磁盘上，格式为
//! `i32 sizes[N]` 后接 `N` 个 30 字符宽的名字，每个字符占两字节(UTF-16)。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::warn;

use crate::layout::{read_i32, write_i32};
use crate::{Error, Result};

/// 文件名最多保留的字符数，更长的名字会被截断
pub const NAME_MAX_LEN: usize = 30;

const NAME_BYTES: usize = NAME_MAX_LEN * 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    sizes: Vec<u32>,
    names: Vec<[u16; NAME_MAX_LEN]>,
}

impl Directory {
    pub const ROOT: &'static str = "/";

    pub fn new(max_inodes: u16) -> Self {
        let max_inodes = max_inodes as usize;
        let mut dir = Self {
            sizes: vec![0; max_inodes],
            names: vec![[0; NAME_MAX_LEN]; max_inodes],
        };
        if max_inodes > 0 {
            dir.set_name(0, Self::ROOT);
        }
        dir
    }

    /// 槽位总数，即 inode 总数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sizes.len()
    }

    /// 序列化后的字节数
    #[inline]
    pub fn byte_len(&self) -> usize {
        Self::bytes_for(self.capacity())
    }

    /// 容纳 `max_inodes` 个槽位的目录序列化后的字节数
    #[inline]
    pub fn bytes_for(max_inodes: usize) -> usize {
        max_inodes * (4 + NAME_BYTES)
    }

    /// 为新文件分配 inode 号
    pub fn alloc_inode(&mut self, name: &str) -> Result<u16> {
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let inode_id = self
            .sizes
            .iter()
            .skip(1)
            .position(|&size| size == 0)
            .map(|i| i + 1)
            .ok_or(Error::CapacityExhausted)?;
        self.set_name(inode_id, name);

        Ok(inode_id as u16)
    }

    /// 释放 inode 号；名字本身不擦除，只是不再有意义
    pub fn free_inode(&mut self, inode_id: u16) -> Result<()> {
        let inode_id = inode_id as usize;
        if inode_id == 0 || inode_id >= self.capacity() {
            return Err(Error::InvalidArgument);
        }

        self.sizes[inode_id] = 0;
        Ok(())
    }

    /// 根据文件名获取 inode 号
    pub fn resolve(&self, name: &str) -> Option<u16> {
        if name.is_empty() {
            return None;
        }

        let probe = Self::encode_name(name);
        (0..self.capacity())
            .find(|&i| self.sizes[i] > 0 && self.name_units(i) == probe.as_slice())
            .map(|i| i as u16)
    }

    /// 所有已分配的文件，不含根目录
    pub fn entries(&self) -> impl Iterator<Item = (u16, String)> + '_ {
        (1..self.capacity())
            .filter(|&i| self.sizes[i] > 0)
            .map(|i| (i as u16, String::from_utf16_lossy(self.name_units(i))))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0; self.byte_len()];
        let names_start = self.capacity() * 4;

        for (i, &size) in self.sizes.iter().enumerate() {
            write_i32(&mut data, i * 4, size as i32);
        }

        for (name, raw) in self
            .names
            .iter()
            .zip(data[names_start..].chunks_exact_mut(NAME_BYTES))
        {
            for (&unit, raw) in name.iter().zip(raw.chunks_exact_mut(2)) {
                raw.copy_from_slice(&unit.to_be_bytes());
            }
        }

        data
    }

    /// 用磁盘上的字节重建目录。空内容说明刚格式化，保留默认状态
    pub fn from_bytes(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() < self.byte_len() {
            warn!(
                "directory blob too short: {} < {}",
                data.len(),
                self.byte_len()
            );
            return Err(Error::InvalidArgument);
        }

        let names_start = self.capacity() * 4;
        for (i, size) in self.sizes.iter_mut().enumerate() {
            let raw = read_i32(data, i * 4);
            *size = raw.clamp(0, NAME_MAX_LEN as i32) as u32;
        }

        for (name, raw) in self
            .names
            .iter_mut()
            .zip(data[names_start..].chunks_exact(NAME_BYTES))
        {
            for (unit, raw) in name.iter_mut().zip(raw.chunks_exact(2)) {
                *unit = u16::from_be_bytes([raw[0], raw[1]]);
            }
        }

        Ok(())
    }
}

impl Directory {
    /// 截断到 [`NAME_MAX_LEN`] 个 UTF-16 码元
    #[inline]
    fn encode_name(name: &str) -> Vec<u16> {
        name.encode_utf16().take(NAME_MAX_LEN).collect()
    }

    #[inline]
    fn name_units(&self, inode_id: usize) -> &[u16] {
        &self.names[inode_id][..self.sizes[inode_id] as usize]
    }

    fn set_name(&mut self, inode_id: usize, name: &str) {
        let units = Self::encode_name(name);
        self.names[inode_id][..units.len()].copy_from_slice(&units);
        self.sizes[inode_id] = units.len() as u32;
    }
}
