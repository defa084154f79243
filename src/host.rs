//! # 宿主平台后端
//!
//! 在普通操作系统上运行服务器时使用的实现：非阻塞的 TCP 监听端口与连接，
//! 以及以某个本地目录为根的文件存储。

use std::{
    fs::File,
    io::{self, ErrorKind, Read, Seek, SeekFrom, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    path::PathBuf,
    thread,
    time::Duration,
};

use log::{debug, warn};

use crate::{
    config::Config,
    param::FRAME_SIZE,
    platform::{Client, Listener, Storage, WebFile},
};

/// 连接接收缓冲区大小
const READ_BUFFER_SIZE: usize = 512;

/// 发送缓冲区大小。套接字暂时写不下的数据保存在这里，等待后续调度再发送。
const WRITE_WINDOW: usize = 2 * FRAME_SIZE;

/// 关闭连接前最多读取并丢弃的次数
const DRAIN_LIMIT: usize = 16;

/// 关闭连接时，把发送缓冲区中剩余数据写完的最长时间
const LINGER_TIMEOUT: Duration = Duration::from_secs(30);

/// 非阻塞的 TCP 监听端口
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    /// 按配置绑定：`local` 为真时只监听回环地址
    pub fn from_config(config: &Config) -> io::Result<Self> {
        let host = if config.local() { "127.0.0.1" } else { "0.0.0.0" };
        Self::bind((host, config.port()))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpTransport {
    type Client = TcpClient;

    fn accept(&mut self) -> Option<TcpClient> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!("无法将来自{}的连接设置为非阻塞：{}", addr, e);
                    return None;
                }
                debug!("TCP连接来自{}", addr);
                Some(TcpClient::new(stream))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("接受连接失败：{}", e);
                None
            }
        }
    }

    fn is_listening(&self) -> bool {
        self.listener.local_addr().is_ok()
    }
}

/// 一个非阻塞的 TCP 连接。
///
/// 读取经过一个小的接收缓冲区，以便按字节读取。写入时套接字接受不了的部分
/// 放入发送缓冲区，缓冲区非空时报告没有写入空间，由服务器在之后的调度中重试。
#[derive(Debug)]
pub struct TcpClient {
    stream: TcpStream,
    buffer: [u8; READ_BUFFER_SIZE],
    start: usize,
    end: usize,
    output: [u8; WRITE_WINDOW],
    out_start: usize,
    out_end: usize,
    closed: bool,
}

impl TcpClient {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: [0u8; READ_BUFFER_SIZE],
            start: 0,
            end: 0,
            output: [0u8; WRITE_WINDOW],
            out_start: 0,
            out_end: 0,
            closed: false,
        }
    }

    /// 接收缓冲区读空时尝试从套接字补充数据
    fn fill(&mut self) {
        if self.start < self.end || self.closed {
            return;
        }
        self.start = 0;
        self.end = 0;
        match self.stream.read(&mut self.buffer) {
            Ok(0) => self.closed = true,
            Ok(n) => self.end = n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("读取连接失败：{}", e);
                self.closed = true;
            }
        }
    }

    /// 尚未交给套接字的字节数
    fn pending(&self) -> usize {
        self.out_end - self.out_start
    }

    /// 尽量发送发送缓冲区中的数据，套接字写满时立即返回
    fn drain_output(&mut self) {
        if self.pending() == 0 {
            return;
        }
        let output = &self.output[self.out_start..self.out_end];
        self.out_start += send_nonblocking(&mut self.stream, &mut self.closed, output);
        if self.out_start == self.out_end {
            self.out_start = 0;
            self.out_end = 0;
        }
    }

    /// 把数据追加到发送缓冲区，返回放入的字节数
    fn enqueue(&mut self, data: &[u8]) -> usize {
        if self.out_start > 0 {
            self.output.copy_within(self.out_start..self.out_end, 0);
            self.out_end -= self.out_start;
            self.out_start = 0;
        }
        let n = data.len().min(WRITE_WINDOW - self.out_end);
        self.output[self.out_end..self.out_end + n].copy_from_slice(&data[..n]);
        self.out_end += n;
        n
    }
}

/// 非阻塞地把数据写入套接字，返回套接字接受的字节数。写入出错时设置 `closed`。
fn send_nonblocking(stream: &mut TcpStream, closed: &mut bool, data: &[u8]) -> usize {
    let mut written = 0;
    while written < data.len() && !*closed {
        match stream.write(&data[written..]) {
            Ok(0) => *closed = true,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                debug!("写入连接失败：{}", e);
                *closed = true;
            }
        }
    }
    written
}

/// 关闭写方向，并读完已经到达的数据。
/// 关闭仍有未读数据的套接字会向对端发送 RST。
fn close_stream(stream: &mut TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Write) {
        debug!("关闭连接写方向失败：{}", e);
    }
    let mut scratch = [0u8; READ_BUFFER_SIZE];
    for _ in 0..DRAIN_LIMIT {
        match stream.read(&mut scratch) {
            Ok(n) if n > 0 => continue,
            _ => break,
        }
    }
}

/// 以阻塞方式写完剩余数据，超时后放弃
fn write_remaining(stream: &mut TcpStream, remaining: &[u8]) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(LINGER_TIMEOUT))?;
    stream.write_all(remaining)?;
    stream.set_nonblocking(true)
}

/// 在后台线程中写完剩余数据后关闭连接，调度器不必等待慢速客户端
fn linger(mut stream: TcpStream, remaining: Vec<u8>) {
    let spawned = thread::Builder::new()
        .name("coopweb-linger".into())
        .spawn(move || match write_remaining(&mut stream, &remaining) {
            Ok(()) => close_stream(&mut stream),
            Err(e) => warn!("关闭前未能发送剩余的{}字节：{}", remaining.len(), e),
        });
    if let Err(e) = spawned {
        warn!("无法创建关闭连接的线程：{}", e);
    }
}

impl Client for TcpClient {
    fn available(&mut self) -> usize {
        self.fill();
        self.end - self.start
    }

    fn read(&mut self) -> Option<u8> {
        self.fill();
        if self.start < self.end {
            let c = self.buffer[self.start];
            self.start += 1;
            Some(c)
        } else {
            None
        }
    }

    /// 发送缓冲区中还有数据时报告 0
    fn available_for_write(&mut self) -> usize {
        self.drain_output();
        if self.closed || self.pending() > 0 {
            0
        } else {
            WRITE_WINDOW
        }
    }

    /// 从不等待：套接字写不下的部分放入发送缓冲区，缓冲区也放不下的部分不计入返回值
    fn write(&mut self, data: &[u8]) -> usize {
        self.drain_output();
        if self.closed {
            return 0;
        }
        let sent = if self.pending() == 0 {
            send_nonblocking(&mut self.stream, &mut self.closed, data)
        } else {
            0
        };
        if self.closed {
            return sent;
        }
        sent + self.enqueue(&data[sent..])
    }

    fn flush(&mut self) {
        self.drain_output();
        if let Err(e) = self.stream.flush() {
            debug!("刷新连接失败：{}", e);
        }
    }

    fn stop(&mut self) {
        self.drain_output();
        if self.pending() > 0 && !self.closed {
            let remaining = self.output[self.out_start..self.out_end].to_vec();
            debug!("套接字已满，剩余{}字节在后台发送", remaining.len());
            match self.stream.try_clone() {
                Ok(stream) => linger(stream, remaining),
                Err(e) => warn!("无法复制连接句柄，丢弃剩余的{}字节：{}", remaining.len(), e),
            }
        } else {
            close_stream(&mut self.stream);
        }
        self.out_start = 0;
        self.out_end = 0;
        self.closed = true;
        self.start = self.end;
    }

    /// 对端关闭后，已经收到但尚未读取的数据仍然可以读取
    fn connected(&self) -> bool {
        !self.closed || self.start < self.end
    }
}

/// 以本地目录为根的文件存储
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_root())
    }
}

impl Storage for FsStorage {
    type File = FsFile;

    fn open(&mut self, path: &str) -> Option<FsFile> {
        if path.split(&['/', '\\'][..]).any(|component| component == "..") {
            warn!("拒绝访问Web根目录之外的路径{}", path);
            return None;
        }
        let full = self.root.join(path.trim_start_matches('/'));
        let file = File::open(&full).ok()?;
        let metadata = file.metadata().ok()?;
        if !metadata.is_file() {
            debug!("{}不是普通文件", full.display());
            return None;
        }
        Some(FsFile {
            file: Some(file),
            size: metadata.len(),
            position: 0,
            read_only: metadata.permissions().readonly(),
        })
    }

    fn is_ready(&self) -> bool {
        self.root.is_dir()
    }
}

#[derive(Debug)]
pub struct FsFile {
    file: Option<File>,
    size: u64,
    position: u64,
    read_only: bool,
}

impl WebFile for FsFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => return 0,
        };
        match file.read(buf) {
            Ok(n) => {
                self.position += n as u64;
                n
            }
            Err(e) => {
                warn!("读取文件失败：{}", e);
                0
            }
        }
    }

    fn seek_end(&mut self) {
        if let Some(file) = self.file.as_mut() {
            match file.seek(SeekFrom::End(0)) {
                Ok(position) => self.position = position,
                Err(e) => warn!("文件定位失败：{}", e),
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        self.file = None;
    }
}
