// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖请求行解析错误、方法错误、文件系统错误以及扩展回调拒绝请求。
//! - **语义映射**：每个变体都唯一对应一个终止性的 HTTP 响应状态码。
//! - **精简模式**：在 `ErrorPolicy::NotFoundOnly` 下，所有错误都折叠为 404。
//!
//! 所有错误都在本地、同步地通过提前返回处理，不会被重试。

use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::param::*;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 请求行在输入耗尽前没有换行符，缺少协议版本标记，或 POST 请求头没有结束。
    MalformedRequest,
    /// 解码后的路径无法作为 UTF-8 字符串交给存储介质。
    RequestIsNotUtf8,
    /// 请求行填满了缓冲区仍没有遇到换行符。
    UriTooLong,
    /// 客户端使用了服务器不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 在 Web 根目录下未找到所请求的文件。
    FileNotFound,
    /// 扩展回调拒绝了表单或请求体数据。
    RequestRejected,
}

use Exception::*;

/// 错误报告策略
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// 每种错误返回各自的状态码
    Full,
    /// 所有错误都报告为 404，节省代码体积
    NotFoundOnly,
}

impl Exception {
    pub fn status_code(&self) -> u16 {
        match self {
            MalformedRequest | RequestIsNotUtf8 | RequestRejected => 400,
            UriTooLong => 414,
            UnSupportedRequestMethod => 405,
            FileNotFound => 404,
        }
    }

    /// 按照错误策略折叠异常类型
    pub fn collapse(self, policy: ErrorPolicy) -> Self {
        match policy {
            ErrorPolicy::Full => self,
            ErrorPolicy::NotFoundOnly => FileNotFound,
        }
    }

    /// 该异常对应的完整预制响应报文（状态行、响应头与 HTML 正文）
    pub fn canned_response(&self) -> &'static str {
        match self.status_code() {
            414 => RESPONSE_414,
            405 => RESPONSE_405,
            404 => RESPONSE_404,
            _ => RESPONSE_400,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest => write!(f, "Malformed request (400)"),
            RequestIsNotUtf8 => write!(f, "Request path can't be parsed in UTF-8 (400)"),
            UriTooLong => write!(f, "Request line too long (414)"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method (405)"),
            FileNotFound => write!(f, "File not found (404)"),
            RequestRejected => write!(f, "Request rejected by callback (400)"),
        }
    }
}

impl std::error::Error for Exception {}
