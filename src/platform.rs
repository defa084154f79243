//! # 外部协作者接口
//!
//! 网络传输、存储介质与空闲内存查询都由外部提供，服务器只通过下面这些 trait 与它们交互。
//! 所有方法都必须是非阻塞的：没有数据时立即返回，而不是等待。
//!
//! - [`Listener`]：接受新连接。
//! - [`Client`]：单个连接的读写、刷新与关闭。
//! - [`Storage`] / [`WebFile`]：只读方式打开并顺序读取文件。
//! - [`MemoryProbe`]：查询当前可用的工作内存。

/// 监听端口，产生新的客户端连接
pub trait Listener {
    type Client: Client;

    /// 非阻塞地接受一个连接，没有待处理连接时返回 `None`
    fn accept(&mut self) -> Option<Self::Client>;

    fn is_listening(&self) -> bool {
        true
    }
}

/// 一个已建立的客户端连接
pub trait Client {
    /// 当前可以立即读取的字节数
    fn available(&mut self) -> usize;

    /// 读取一个字节，没有数据时返回 `None`
    fn read(&mut self) -> Option<u8>;

    /// 发送缓冲区当前的剩余空间
    fn available_for_write(&mut self) -> usize;

    /// 写入数据，返回实际写入的字节数
    fn write(&mut self, data: &[u8]) -> usize;

    fn flush(&mut self);

    /// 关闭连接
    fn stop(&mut self);

    fn connected(&self) -> bool;
}

/// 存放网站文件的存储介质
pub trait Storage {
    type File: WebFile;

    /// 以只读方式打开文件，失败时返回 `None`
    fn open(&mut self, path: &str) -> Option<Self::File>;

    /// 存储介质是否可用
    fn is_ready(&self) -> bool {
        true
    }
}

/// 存储介质上已打开的文件
pub trait WebFile {
    /// 从当前位置读取，返回实际读取的字节数
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// 把读取位置移动到文件末尾
    fn seek_end(&mut self);

    fn position(&self) -> u64;

    fn size(&self) -> u64;

    /// 尚未读取的字节数
    fn available(&self) -> u64 {
        self.size().saturating_sub(self.position())
    }

    /// 只读属性，只读文件可以被客户端缓存
    fn is_read_only(&self) -> bool;

    fn is_open(&self) -> bool;

    fn close(&mut self);
}

/// 空闲工作内存查询
#[cfg_attr(test, mockall::automock)]
pub trait MemoryProbe {
    /// 当前可用于临时缓冲区的字节数，每发送一个分块前都会重新查询
    fn free_memory(&self) -> usize;
}

/// 固定的内存上限，适用于没有实时查询手段的平台
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub usize);

impl MemoryProbe for FixedMemory {
    fn free_memory(&self) -> usize {
        self.0
    }
}
