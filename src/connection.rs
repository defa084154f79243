// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接槽与单连接状态机
//!
//! 每个连接槽在一次调度中最多推进一个阶段：
//!
//! ```text
//! Unknown ──解析成功──> HeaderPending ──发送响应头──> Streaming ──发送完毕──> Finished
//!    │                                                  ↑
//!    └──错误且有自定义 404 页面─────────────────────────┘（经由 HeaderPending(NotFound)）
//! ```
//!
//! 其他错误直接写出预制的错误页面并结束连接。

use log::{debug, info, warn};

use crate::{
    callback::ServerCallback,
    config::Config,
    exception::Exception,
    param::*,
    platform::{Client, MemoryProbe, Storage, WebFile},
    request::{accept_incoming, ParseOutcome},
    response::{Response, ResponseBuffer},
    transfer::{send_chunk, Transfer},
};

/// 连接所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 刚接受的连接，请求尚未解析
    Unknown,
    /// 文件已打开，等待发送响应头
    HeaderPending(Classification),
    /// 正在（由回调或服务器）发送文件内容
    Streaming(Classification),
    /// 连接已关闭，槽位可以复用
    Finished,
}

/// 一个连接槽。槽位有连接时即为活动状态。
#[derive(Debug)]
pub struct Slot<C, F> {
    client: Option<C>,
    file: Option<F>,
    phase: Phase,
    pending_action: bool,
    id: u128,
}

impl<C, F> Default for Slot<C, F> {
    fn default() -> Self {
        Self {
            client: None,
            file: None,
            phase: Phase::Finished,
            pending_action: false,
            id: 0,
        }
    }
}

impl<C: Client, F: WebFile> Slot<C, F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把新接受的连接放入槽位
    pub fn open(&mut self, client: C, id: u128) {
        self.client = Some(client);
        self.file = None;
        self.phase = Phase::Unknown;
        self.pending_action = true;
        self.id = id;
    }

    /// 推进一个阶段
    pub fn step<S, M, B>(
        &mut self,
        storage: &mut S,
        callback: &mut B,
        memory: &M,
        config: &Config,
        buffer: &mut [u8; FRAME_SIZE],
        multi_stream: bool,
    ) where
        S: Storage<File = F>,
        M: MemoryProbe + ?Sized,
        B: ServerCallback + ?Sized,
    {
        let id = self.id;
        let client = match self.client.as_mut() {
            Some(c) => c,
            None => return,
        };
        if !client.connected() {
            info!("[ID{}]客户端已断开连接", id);
            self.finalize();
            return;
        }

        match self.phase {
            Phase::Unknown => {
                match accept_incoming(client, &mut self.file, storage, callback, config, id) {
                    Ok(ParseOutcome::Pending) => {}
                    Ok(ParseOutcome::Resolved {
                        classification,
                        pending_action,
                    }) => {
                        self.pending_action = pending_action;
                        self.phase = Phase::HeaderPending(classification);
                    }
                    Err(e) => self.fail(e, storage, config),
                }
            }
            Phase::HeaderPending(classification) => {
                let file = match self.file.as_ref() {
                    Some(f) => f,
                    None => {
                        warn!("[ID{}]没有打开的文件，无法发送响应头", id);
                        self.finalize();
                        return;
                    }
                };
                let header = Response::new(classification)
                    .set_cacheable(file.is_read_only())
                    .set_content_length(if self.pending_action {
                        None
                    } else {
                        Some(file.size())
                    })
                    .header();
                client.write(header.as_bytes());
                debug!("[ID{}]响应头已发送（{}字节）", id, header.len());
                self.phase = Phase::Streaming(classification);
            }
            Phase::Streaming(_) => {
                let file = match self.file.as_mut() {
                    Some(f) => f,
                    None => {
                        self.finalize();
                        return;
                    }
                };
                if self.pending_action {
                    self.pending_action = callback.file_action(client, file);
                    if !self.pending_action {
                        debug!("[ID{}]回调处理完毕，发送文件剩余部分", id);
                    }
                    return;
                }
                match send_chunk(client, file, buffer, memory, multi_stream, id) {
                    Transfer::Sent(_) => {
                        if file.available() == 0 {
                            self.finalize();
                        }
                    }
                    Transfer::Blocked => {}
                    Transfer::Complete => self.finalize(),
                }
            }
            Phase::Finished => {}
        }
    }

    /// 报告错误。可以使用自定义 404 页面时转入正常的发送流程，否则写出预制页面并结束连接。
    fn fail<S: Storage<File = F>>(&mut self, e: Exception, storage: &mut S, config: &Config) {
        let e = e.collapse(config.error_policy());
        warn!("[ID{}]{}", self.id, e);

        if e == Exception::FileNotFound && self.file.is_none() {
            let mut path = ResponseBuffer::<REQUEST_LINE_CAPACITY>::new();
            path.push(config.www_root().as_bytes());
            path.push(NOT_FOUND_DOCUMENT.as_bytes());
            if let Ok(path) = std::str::from_utf8(path.as_bytes()) {
                if let Some(page) = storage.open(path) {
                    debug!("[ID{}]使用自定义404页面{}", self.id, path);
                    self.file = Some(page);
                    self.pending_action = false;
                    self.phase = Phase::HeaderPending(Classification::NotFound);
                    return;
                }
            }
        }

        if let Some(client) = self.client.as_mut() {
            client.write(e.canned_response().as_bytes());
        }
        self.finalize();
    }

    /// 刷新并关闭连接、关闭文件，槽位回到空闲状态
    pub fn finalize(&mut self) {
        if let Some(client) = self.client.as_mut() {
            client.flush();
            client.stop();
        }
        if let Some(mut file) = self.file.take() {
            file.close();
        }
        self.client = None;
        self.phase = Phase::Finished;
        info!("[ID{}]请求完成", self.id);
    }
}

// --- Getter 访问器实现 ---

impl<C, F> Slot<C, F> {
    pub fn is_active(&self) -> bool {
        self.client.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_action(&self) -> bool {
        self.pending_action
    }

    pub fn id(&self) -> u128 {
        self.id
    }
}
