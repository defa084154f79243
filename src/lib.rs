//! # coopweb
//!
//! 面向嵌入式设备的协作式 HTTP 静态文件服务器核心。服务器不创建线程、不阻塞，
//! 所有缓冲区在编译期确定大小；宿主程序在主循环中反复调用
//! [`WebServer::service`] 即可驱动所有连接。
//!
//! 网络、存储与空闲内存查询通过 [`platform`] 中的 trait 注入，
//! [`host`] 提供基于标准库的实现，[`loopback`] 提供基于内存的实现。

pub mod callback;
pub mod config;
pub mod connection;
pub mod exception;
pub mod host;
pub mod loopback;
pub mod param;
pub mod platform;
pub mod request;
pub mod response;
pub mod server;
pub mod transfer;
pub mod util;

pub use callback::{DefaultCallback, ServerCallback};
pub use config::Config;
pub use connection::Phase;
pub use exception::{ErrorPolicy, Exception};
pub use param::{Classification, HttpRequestMethod};
pub use platform::{Client, FixedMemory, Listener, MemoryProbe, Storage, WebFile};
pub use server::{SingleStreamServer, WebServer};
