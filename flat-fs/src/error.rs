use derive_more::Display;

/// 文件系统各层统一的错误类型
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 文件名没有对应的 inode，或句柄未登记
    #[display(fmt = "no such file")]
    NotFound,
    /// 空文件名、越界的 inode 号或块号、无法识别的参数
    #[display(fmt = "invalid argument")]
    InvalidArgument,
    /// 目录已满、空闲块耗尽或文件已达最大长度
    #[display(fmt = "capacity exhausted")]
    CapacityExhausted,
    /// 读只写句柄，或写只读句柄
    #[display(fmt = "operation not permitted by open mode")]
    ModeViolation,
    /// 块映射的增长不连续、重复分配索引块等
    #[display(fmt = "block map structure violated")]
    StructuralViolation,
    /// 仍有打开的句柄
    #[display(fmt = "file system busy")]
    Busy,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
