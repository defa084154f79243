//! # 内存回环后端
//!
//! 用内存实现的监听器、连接与存储介质，便于在没有网络与存储卡的环境中驱动调度器。
//! 服务器持有连接与文件本身，测试代码通过共享句柄（`LoopbackPeer`、`MemStorage` 的克隆）
//! 观察发送出去的字节、打开与读取次数等。

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::platform::{Client, Listener, Storage, WebFile};

/// 未设置写窗口时报告的发送缓冲区空间
pub const DEFAULT_WRITE_WINDOW: usize = 2048;

#[derive(Debug)]
struct LoopbackState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    writes: Vec<usize>,
    write_window: usize,
    connected: bool,
    stopped: bool,
    flushes: usize,
}

/// 服务器一侧的连接
#[derive(Debug)]
pub struct LoopbackClient {
    state: Rc<RefCell<LoopbackState>>,
}

/// 测试一侧的连接句柄
#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    state: Rc<RefCell<LoopbackState>>,
}

impl LoopbackClient {
    pub fn pair() -> (Self, LoopbackPeer) {
        let state = Rc::new(RefCell::new(LoopbackState {
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            writes: Vec::new(),
            write_window: DEFAULT_WRITE_WINDOW,
            connected: true,
            stopped: false,
            flushes: 0,
        }));
        (
            Self {
                state: Rc::clone(&state),
            },
            LoopbackPeer { state },
        )
    }
}

impl LoopbackPeer {
    pub fn send(&self, data: &[u8]) {
        self.state.borrow_mut().inbound.extend(data.iter().copied());
    }

    pub fn received(&self) -> Vec<u8> {
        self.state.borrow().outbound.clone()
    }

    pub fn received_string(&self) -> String {
        String::from_utf8_lossy(&self.state.borrow().outbound).to_string()
    }

    /// 每次 `write` 调用写入的字节数
    pub fn write_sizes(&self) -> Vec<usize> {
        self.state.borrow().writes.clone()
    }

    pub fn set_write_window(&self, window: usize) {
        self.state.borrow_mut().write_window = window;
    }

    /// 模拟客户端断开连接
    pub fn disconnect(&self) {
        self.state.borrow_mut().connected = false;
    }

    /// 服务器是否已经关闭了这个连接
    pub fn is_stopped(&self) -> bool {
        self.state.borrow().stopped
    }

    pub fn flushes(&self) -> usize {
        self.state.borrow().flushes
    }

    pub fn unread(&self) -> usize {
        self.state.borrow().inbound.len()
    }
}

impl Client for LoopbackClient {
    fn available(&mut self) -> usize {
        self.state.borrow().inbound.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.state.borrow_mut().inbound.pop_front()
    }

    fn available_for_write(&mut self) -> usize {
        let state = self.state.borrow();
        if state.connected && !state.stopped {
            state.write_window
        } else {
            0
        }
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mut state = self.state.borrow_mut();
        if !state.connected || state.stopped {
            return 0;
        }
        state.outbound.extend_from_slice(data);
        state.writes.push(data.len());
        data.len()
    }

    fn flush(&mut self) {
        self.state.borrow_mut().flushes += 1;
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.stopped = true;
        state.connected = false;
    }

    fn connected(&self) -> bool {
        let state = self.state.borrow();
        state.connected && !state.stopped
    }
}

/// 回环监听器，等待接受的连接由 [`LoopbackConnector`] 放入
#[derive(Debug)]
pub struct LoopbackListener {
    pending: Rc<RefCell<VecDeque<LoopbackClient>>>,
}

#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    pending: Rc<RefCell<VecDeque<LoopbackClient>>>,
}

impl LoopbackListener {
    pub fn new() -> (Self, LoopbackConnector) {
        let pending = Rc::new(RefCell::new(VecDeque::new()));
        (
            Self {
                pending: Rc::clone(&pending),
            },
            LoopbackConnector { pending },
        )
    }
}

impl LoopbackConnector {
    /// 发起一个新连接，返回测试一侧的句柄
    pub fn connect(&self) -> LoopbackPeer {
        let (client, peer) = LoopbackClient::pair();
        self.pending.borrow_mut().push_back(client);
        peer
    }

    /// 发起连接并立即发送请求
    pub fn request(&self, request: &str) -> LoopbackPeer {
        let peer = self.connect();
        peer.send(request.as_bytes());
        peer
    }

    /// 尚未被服务器接受的连接数
    pub fn backlog(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Listener for LoopbackListener {
    type Client = LoopbackClient;

    fn accept(&mut self) -> Option<LoopbackClient> {
        self.pending.borrow_mut().pop_front()
    }
}

#[derive(Debug)]
struct MemEntry {
    data: Rc<Vec<u8>>,
    read_only: bool,
}

#[derive(Debug, Default)]
struct MemInner {
    files: HashMap<String, MemEntry>,
    opens: HashMap<String, usize>,
    open_files: usize,
    read_calls: usize,
    bytes_read: usize,
}

/// 内存中的存储介质。克隆出来的句柄共享同一份文件与统计数据。
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    inner: Rc<RefCell<MemInner>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: &[u8], read_only: bool) {
        self.inner.borrow_mut().files.insert(
            path.to_string(),
            MemEntry {
                data: Rc::new(data.to_vec()),
                read_only,
            },
        );
    }

    /// 某个路径被尝试打开的次数
    pub fn open_count(&self, path: &str) -> usize {
        self.inner.borrow().opens.get(path).copied().unwrap_or(0)
    }

    /// 当前仍处于打开状态的文件数
    pub fn open_files(&self) -> usize {
        self.inner.borrow().open_files
    }

    pub fn read_calls(&self) -> usize {
        self.inner.borrow().read_calls
    }

    pub fn bytes_read(&self) -> usize {
        self.inner.borrow().bytes_read
    }
}

impl Storage for MemStorage {
    type File = MemFile;

    fn open(&mut self, path: &str) -> Option<MemFile> {
        let mut inner = self.inner.borrow_mut();
        *inner.opens.entry(path.to_string()).or_insert(0) += 1;
        let (data, read_only) = match inner.files.get(path) {
            Some(entry) => (Rc::clone(&entry.data), entry.read_only),
            None => return None,
        };
        inner.open_files += 1;
        Some(MemFile {
            data,
            pos: 0,
            read_only,
            open: true,
            inner: Rc::clone(&self.inner),
        })
    }
}

#[derive(Debug)]
pub struct MemFile {
    data: Rc<Vec<u8>>,
    pos: usize,
    read_only: bool,
    open: bool,
    inner: Rc<RefCell<MemInner>>,
}

impl WebFile for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.open {
            return 0;
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;

        let mut inner = self.inner.borrow_mut();
        inner.read_calls += 1;
        inner.bytes_read += n;
        n
    }

    fn seek_end(&mut self) {
        self.pos = self.data.len();
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.inner.borrow_mut().open_files -= 1;
        }
    }
}
