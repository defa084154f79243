// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块直接从连接的字节流中解析请求，并把请求解析为存储介质上的一个已打开文件：
//! 1. 请求行（Request-Line）的读取，缓冲区预先写入 Web 根目录。
//! 2. 方法识别与协议版本标记的定位。
//! 3. POST 请求头的单遍扫描，提取 `Content-Length`。
//! 4. 查询字符串拆分与路径的原地 URL 解码。
//! 5. 打开文件、确定内容分类，并调用扩展回调。
//!
//! 所有工作都在固定容量的缓冲区中完成，超出容量是一个明确的错误，而不是扩容。

use log::{debug, info, warn};

use crate::{
    callback::ServerCallback,
    config::Config,
    exception::Exception,
    param::*,
    platform::{Client, Storage, WebFile},
    util::{classify, url_decode},
};

/// 一个已经解析完毕的请求行。
///
/// 缓冲区的布局为：`<web root><解码后的路径>` 紧接着（可能存在的）未解码查询字符串。
#[derive(Debug, Clone)]
pub struct Request {
    buffer: [u8; REQUEST_LINE_CAPACITY],
    path_len: usize,
    /// 查询字符串在缓冲区中的范围：(起始, 结束)
    query: Option<(usize, usize)>,
    method: HttpRequestMethod,
    content_length: Option<u64>,
}

/// 请求解析的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// 连接上还没有任何数据，下一次调度再试
    Pending,
    /// 文件已经打开并放入连接槽
    Resolved {
        classification: Classification,
        pending_action: bool,
    },
}

impl Request {
    /// 从连接中读取并解析请求行。
    ///
    /// # 逻辑步骤
    /// 1. 读取直到换行符。缓冲区写满后仍没有换行符为 `UriTooLong`，缓冲区未满而输入先耗尽为 `MalformedRequest`。
    /// 2. 识别方法标记，并把剩余部分左移，使其以 `/` 开头紧跟在 Web 根目录之后。
    /// 3. 在 ` HTTP` 标记处截断请求目标。
    /// 4. 对于 POST，扫描剩余请求头直到空行，同时提取声明的请求体长度。
    /// 5. 在第一个 `?` 处拆分查询字符串，只解码路径部分。
    /// 6. 路径以 `/` 结尾时追加默认文档名，并丢弃查询字符串。
    pub fn try_from<C: Client + ?Sized>(
        client: &mut C,
        web_root: &str,
        allow_post: bool,
        id: u128,
    ) -> Result<Self, Exception> {
        let mut buffer = [0u8; REQUEST_LINE_CAPACITY];
        let root_len = web_root.len();
        if root_len >= REQUEST_LINE_CAPACITY {
            return Err(Exception::UriTooLong);
        }
        buffer[..root_len].copy_from_slice(web_root.as_bytes());

        // 1. 读取请求行
        let mut len = root_len;
        let mut terminated = false;
        while let Some(c) = client.read() {
            if c == b'\n' {
                terminated = true;
                break;
            }
            if len == REQUEST_LINE_CAPACITY {
                break;
            }
            buffer[len] = c;
            len += 1;
        }
        if !terminated {
            if len == REQUEST_LINE_CAPACITY {
                warn!("[ID{}]请求行超过{}字节", id, REQUEST_LINE_CAPACITY);
                return Err(Exception::UriTooLong);
            }
            warn!("[ID{}]请求行没有换行符", id);
            return Err(Exception::MalformedRequest);
        }
        let crlf = len > root_len && buffer[len - 1] == b'\r';
        if crlf {
            len -= 1;
        }
        debug!(
            "[ID{}]请求行：{}",
            id,
            String::from_utf8_lossy(&buffer[root_len..len])
        );

        // 2. 识别方法
        let method = METHODS
            .iter()
            .copied()
            .filter(|m| allow_post || *m != HttpRequestMethod::Post)
            .find(|m| buffer[root_len..len].starts_with(m.marker()))
            .ok_or_else(|| {
                warn!("[ID{}]不支持的HTTP请求方法", id);
                Exception::UnSupportedRequestMethod
            })?;
        let shift = method.marker().len() - 1;
        buffer.copy_within(root_len + shift..len, root_len);
        len -= shift;

        // 3. 协议版本标记。URL 是编码过的，标记不会出现在路径中。
        let marker = find(&buffer[root_len..len], PROTOCOL_MARKER).ok_or_else(|| {
            warn!("[ID{}]请求行中没有协议版本标记", id);
            Exception::MalformedRequest
        })?;
        len = root_len + marker;

        // 4. POST 请求头
        let content_length = match method {
            HttpRequestMethod::Post => Some(scan_headers(client, crlf, id)?),
            _ => None,
        };

        // 5. 查询字符串与路径解码
        let (path_end, mut query) = match buffer[root_len..len].iter().position(|&c| c == b'?') {
            Some(q) => {
                let start = root_len + q + 1;
                (root_len + q, if start < len { Some((start, len)) } else { None })
            }
            None => (len, None),
        };
        let mut path_len = root_len + url_decode(&mut buffer[root_len..path_end]);

        // 6. 默认文档。追加的文件名可能覆盖查询字符串，所以默认文档不能带表单数据。
        if buffer[path_len - 1] == b'/' {
            let end = path_len + DEFAULT_DOCUMENT.len();
            if end > REQUEST_LINE_CAPACITY {
                return Err(Exception::UriTooLong);
            }
            buffer[path_len..end].copy_from_slice(DEFAULT_DOCUMENT.as_bytes());
            path_len = end;
            if query.take().is_some() {
                debug!("[ID{}]默认文档请求，丢弃查询字符串", id);
            }
        }

        Ok(Self {
            buffer,
            path_len,
            query,
            method,
            content_length,
        })
    }

    /// 把缓冲区拆分为路径与可写的查询字符串
    fn split_mut(&mut self) -> Result<(&str, Option<&mut [u8]>), Exception> {
        let path_len = self.path_len;
        let (head, tail) = self.buffer.split_at_mut(path_len);
        let path = std::str::from_utf8(head).map_err(|_| Exception::RequestIsNotUtf8)?;
        let query = self
            .query
            .map(move |(start, end)| &mut tail[start - path_len..end - path_len]);
        Ok((path, query))
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 包含 Web 根目录的完整文件路径（已解码）
    pub fn path(&self) -> &[u8] {
        &self.buffer[..self.path_len]
    }

    /// 未解码的查询字符串
    pub fn query(&self) -> Option<&[u8]> {
        self.query.map(|(start, end)| &self.buffer[start..end])
    }

    /// POST 请求声明的请求体长度
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthState {
    Matching(usize),
    Whitespace,
    Digits,
    Done,
}

/// POST 请求头的单遍扫描器。
///
/// 同时寻找表示请求头结束的 `\r\n\r\n`，以及不区分大小写的 `content-length:` 字段名。
/// 没有回看缓冲区，匹配失败时需要检查当前字节是否开始了一次新的匹配。
#[derive(Debug)]
struct HeaderScanner {
    terminator: usize,
    length_state: LengthState,
    length: u64,
}

impl HeaderScanner {
    fn new(after_crlf: bool) -> Self {
        Self {
            terminator: if after_crlf { 2 } else { 0 },
            length_state: LengthState::Matching(0),
            length: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.terminator == 4
    }

    fn feed(&mut self, c: u8) {
        self.terminator = match (self.terminator, c) {
            (0 | 2, b'\r') | (1 | 3, b'\n') => self.terminator + 1,
            (_, b'\r') => 1,
            _ => 0,
        };

        self.length_state = match self.length_state {
            LengthState::Matching(matched) => {
                let c = c.to_ascii_lowercase();
                if c == CONTENT_LENGTH_MARKER[matched] {
                    if matched + 1 == CONTENT_LENGTH_MARKER.len() {
                        LengthState::Whitespace
                    } else {
                        LengthState::Matching(matched + 1)
                    }
                } else if c == CONTENT_LENGTH_MARKER[0] {
                    LengthState::Matching(1)
                } else {
                    LengthState::Matching(0)
                }
            }
            LengthState::Whitespace | LengthState::Digits if c.is_ascii_digit() => {
                self.length = self
                    .length
                    .saturating_mul(10)
                    .saturating_add(u64::from(c - b'0'));
                LengthState::Digits
            }
            LengthState::Whitespace if c == b' ' || c == b'\t' => LengthState::Whitespace,
            LengthState::Whitespace | LengthState::Digits | LengthState::Done => LengthState::Done,
        };
    }
}

/// 读取并丢弃 POST 请求头，返回声明的请求体长度（没有声明时为 0）
fn scan_headers<C: Client + ?Sized>(
    client: &mut C,
    after_crlf: bool,
    id: u128,
) -> Result<u64, Exception> {
    let mut scanner = HeaderScanner::new(after_crlf);
    while !scanner.is_done() {
        match client.read() {
            Some(c) => scanner.feed(c),
            None => {
                warn!("[ID{}]POST请求头没有结束", id);
                return Err(Exception::MalformedRequest);
            }
        }
    }
    debug!("[ID{}]Content-Length: {}", id, scanner.length);
    Ok(scanner.length)
}

/// 处理一个新连接上的请求：解析请求行、打开文件、确定内容分类并调用扩展回调。
///
/// 连接上还没有数据时返回 [`ParseOutcome::Pending`]，不消耗任何字节；这里没有超时，
/// 只要连接保持打开就一直等待。文件一旦打开就放入 `file`，即使随后回调拒绝了请求，
/// 也由连接槽负责关闭它。
pub fn accept_incoming<C, S, B>(
    client: &mut C,
    file: &mut Option<S::File>,
    storage: &mut S,
    callback: &mut B,
    config: &Config,
    id: u128,
) -> Result<ParseOutcome, Exception>
where
    C: Client,
    S: Storage,
    B: ServerCallback + ?Sized,
{
    if client.available() == 0 {
        debug!("[ID{}]等待请求数据到达", id);
        return Ok(ParseOutcome::Pending);
    }

    let mut request = Request::try_from(client, config.www_root(), config.allow_post(), id)?;
    let method = request.method();
    let content_length = request.content_length().unwrap_or(0);
    let (path, query) = request.split_mut()?;
    info!("[ID{}] {} {}", id, method, path);

    let opened = match storage.open(path) {
        Some(f) => f,
        None => {
            warn!("[ID{}]请求的文件{}不存在", id, path);
            return Err(Exception::FileNotFound);
        }
    };
    let opened = file.insert(opened);

    // 只有非只读文件才可能是可变的
    let pending_action =
        config.allow_mutable() && !opened.is_read_only() && callback.is_mutable(path);

    let classification = classify(path.as_bytes());
    debug!("[ID{}]Content-Type: {}", id, classification);

    if method == HttpRequestMethod::Head {
        // HEAD 直接定位到文件末尾，后续流程自然不会发送任何正文
        opened.seek_end();
    }

    match method {
        HttpRequestMethod::Get => {
            if let Some(query) = query {
                debug!("[ID{}]表单数据：{}", id, String::from_utf8_lossy(query));
                if !callback.process_form_data(path, query) {
                    warn!("[ID{}]表单数据被回调拒绝", id);
                    return Err(Exception::RequestRejected);
                }
            }
        }
        HttpRequestMethod::Post => {
            if !callback.process_body_data(path, client, content_length) {
                warn!("[ID{}]POST数据被回调拒绝", id);
                return Err(Exception::RequestRejected);
            }
        }
        HttpRequestMethod::Head => {}
    }

    Ok(ParseOutcome::Resolved {
        classification,
        pending_action,
    })
}
