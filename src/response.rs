//! # 响应头构建
//!
//! 响应头在固定容量的缓冲区中拼接，超出容量的部分被静默截断。
//! 正文（文件内容）不经过这里，而是由 [`transfer`](crate::transfer) 模块分块发送。

use std::fmt;

use log::debug;

use crate::param::*;

/// 固定容量的字节缓冲区，写满之后多余的数据被丢弃
#[derive(Clone)]
pub struct ResponseBuffer<const CAP: usize> {
    buf: [u8; CAP],
    len: usize,
    truncated: bool,
}

impl<const CAP: usize> ResponseBuffer<CAP> {
    pub fn new() -> Self {
        Self {
            buf: [0u8; CAP],
            len: 0,
            truncated: false,
        }
    }

    /// 追加数据，返回实际写入的字节数
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(CAP - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        if n < data.len() {
            self.truncated = true;
        }
        n
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<const CAP: usize> Default for ResponseBuffer<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> fmt::Write for ResponseBuffer<CAP> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}

impl<const CAP: usize> fmt::Debug for ResponseBuffer<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBuffer")
            .field("content", &String::from_utf8_lossy(self.as_bytes()))
            .field("truncated", &self.truncated)
            .finish()
    }
}

/// 一个成功响应的响应头描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    classification: Classification,
    cacheable: bool,
    content_length: Option<u64>,
}

impl Response {
    pub fn new(classification: Classification) -> Self {
        Self {
            classification,
            cacheable: false,
            content_length: None,
        }
    }

    /// 只读文件可以被客户端缓存
    pub fn set_cacheable(&mut self, cacheable: bool) -> &mut Self {
        self.cacheable = cacheable;
        self
    }

    /// 文件内容可能被回调改写时长度未知，此时不发送 `Content-Length`
    pub fn set_content_length(&mut self, length: Option<u64>) -> &mut Self {
        self.content_length = length;
        self
    }

    /// 生成完整的响应头，以空行结束
    pub fn header(&self) -> ResponseBuffer<HEADER_CAPACITY> {
        let mut header = ResponseBuffer::new();
        if self.classification == Classification::NotFound {
            header.push(NOT_FOUND_HEADER.as_bytes());
            return header;
        }

        // 写入 ResponseBuffer 不会失败
        let _ = fmt::Write::write_fmt(
            &mut header,
            format_args!(
                "HTTP/1.0 200 OK{crlf}Server: {}{crlf}Connection: close{crlf}Content-Type: {}{crlf}{}{crlf}",
                SERVER_NAME,
                self.classification.content_type(),
                if self.cacheable { CACHEABLE } else { NON_CACHEABLE },
                crlf = CRLF,
            ),
        );
        if let Some(length) = self.content_length {
            let _ = fmt::Write::write_fmt(
                &mut header,
                format_args!("Content-Length: {}{}", length, CRLF),
            );
        }
        header.push(CRLF.as_bytes());

        if header.is_truncated() {
            debug!("响应头超过{}字节，已被截断", HEADER_CAPACITY);
        }
        header
    }
}
