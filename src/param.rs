// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Web 服务器协议参数与常量模块
//!
//! 该模块集中定义了 `coopweb` 在请求处理过程中使用的全部常量，包括：
//! - 固定容量的缓冲区尺寸（请求行、响应头、POST 数据）。
//! - 文件分块传输所依据的帧大小、扇区大小与栈安全余量。
//! - 支持的请求方法标记。
//! - 文件后缀到内容分类（Classification）的静态映射表。
//! - 预先格式化好的错误响应报文。
//!
//! 所有表格都是普通的不可变静态数据，可以在所有连接槽之间无锁共享。

use std::fmt;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "coopweb/1.0";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 未配置时使用的 Web 根目录
pub const DEFAULT_WEB_ROOT: &str = "/WWW";

/// 请求路径以 `/` 结尾时追加的默认文档名
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// 自定义 404 页面，相对于 Web 根目录
pub const NOT_FOUND_DOCUMENT: &str = "/404.html";

/// 请求行缓冲区容量（包含预先写入的 Web 根目录）
pub const REQUEST_LINE_CAPACITY: usize = 128;

/// 响应头缓冲区容量，超出部分会被静默截断
pub const HEADER_CAPACITY: usize = 256;

/// 默认 POST 处理器一次最多读取的请求体字节数
pub const POST_BUFFER_CAPACITY: usize = 128;

/// 只有一个连接槽时，每次最多发送一个完整的以太网帧
pub const FRAME_SIZE: usize = 1400;

/// 存储介质的扇区大小
pub const SECTOR_SIZE: usize = 512;

/// 多连接时的分块上限，是扇区大小的整数倍
pub const MULTI_STREAM_CHUNK: usize = 2 * SECTOR_SIZE;

/// 为调用栈其余部分保留的空闲内存
pub const STACK_MARGIN: usize = 100;

/// 请求目标之后的协议版本标记
pub const PROTOCOL_MARKER: &[u8] = b" HTTP";

/// POST 请求头中声明请求体长度的字段名（小写，大小写不敏感匹配）
pub const CONTENT_LENGTH_MARKER: &[u8] = b"content-length:";

/// 标准 HTTP 请求方法（本服务器支持的子集）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 提交数据，请求体长度由 `Content-Length` 声明
    Post,
}

impl HttpRequestMethod {
    /// 请求行开头的方法标记，末尾的 `/` 会作为路径的一部分保留下来
    pub fn marker(&self) -> &'static [u8] {
        match *self {
            HttpRequestMethod::Get => b"GET /",
            HttpRequestMethod::Head => b"HEAD /",
            HttpRequestMethod::Post => b"POST /",
        }
    }
}

/// 按顺序尝试匹配的方法列表。各标记互不为前缀，顺序只影响比较次数。
pub const METHODS: [HttpRequestMethod; 3] = [
    HttpRequestMethod::Get,
    HttpRequestMethod::Head,
    HttpRequestMethod::Post,
];

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}

/// 被请求文件的内容分类，决定响应头中的 `Content-Type`。
///
/// `NotFound` 只用于返回自定义 404 页面的情形，其余变体都对应 `200 OK`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NotFound,
    Html,
    Jpeg,
    Gif,
    Png,
    Bmp,
    Icon,
    Svg,
    Text,
    JavaScript,
    Css,
    Csv,
    Eot,
    Woff,
    Woff2,
    Ttf,
    /// 无法识别的后缀
    OctetStream,
}

impl Classification {
    pub fn content_type(&self) -> &'static str {
        use Classification::*;
        match *self {
            NotFound | Html => "text/html",
            Jpeg => "image/jpeg",
            Gif => "image/gif",
            Png => "image/png",
            Bmp => "image/bmp",
            Icon => "image/vnd.microsoft.icon",
            Svg => "image/svg+xml",
            Text => "text/plain",
            JavaScript => "text/javascript",
            Css => "text/css",
            Csv => "text/csv",
            Eot => "application/vnd.ms-fontobject",
            Woff => "font/woff",
            Woff2 => "font/woff2",
            Ttf => "font/ttf",
            OctetStream => "application/octet-stream",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

/// 文件后缀到内容分类的映射表。
///
/// 比较时不区分大小写；表的顺序有意义，同一后缀以第一个匹配项为准。
pub static CLASSIFICATIONS: &[(&str, Classification)] = &[
    ("htm", Classification::Html),
    ("html", Classification::Html),
    ("jpg", Classification::Jpeg),
    ("jpeg", Classification::Jpeg),
    ("gif", Classification::Gif),
    ("png", Classification::Png),
    ("ico", Classification::Icon),
    ("bmp", Classification::Bmp),
    ("svg", Classification::Svg),
    ("txt", Classification::Text),
    ("log", Classification::Text),
    ("js", Classification::JavaScript),
    ("css", Classification::Css),
    ("csv", Classification::Csv),
    // Web 字体
    ("eot", Classification::Eot),
    ("woff", Classification::Woff),
    ("woff2", Classification::Woff2),
    ("ttf", Classification::Ttf),
];

/// 只读文件被视为可缓存
pub const CACHEABLE: &str = "Cache-Control: public, max-age=604800";
pub const NON_CACHEABLE: &str = "Cache-Control: no-cache, no-store, must-revalidate";

/// 返回自定义 404 页面时使用的响应头
pub const NOT_FOUND_HEADER: &str =
    "HTTP/1.0 404 Not Found\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n";

macro_rules! error_page {
    ($status:literal, $title:literal, $message:literal) => {
        concat!(
            "HTTP/1.0 ",
            $status,
            "\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n",
            "<!DOCTYPE html>\n<html>\n<head><title>",
            $title,
            "</title></head>\n<body>\n<h1>",
            $status,
            "</h1>\n<p>",
            $message,
            "</p>\n</body>\n</html>\n"
        )
    };
}

pub const RESPONSE_400: &str =
    error_page!("400 Bad Request", "Bad Request", "The request is malformed.");
pub const RESPONSE_404: &str =
    error_page!("404 Not Found", "Page Not Found", "Page not found.");
pub const RESPONSE_405: &str = error_page!(
    "405 Method Not Allowed",
    "Method Not Allowed",
    "The request method is invalid for this resource."
);
pub const RESPONSE_414: &str = error_page!(
    "414 URI Too Long",
    "Request Too Long",
    "The request is too long. Limit is 128 characters."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_markers_keep_leading_slash() {
        for method in METHODS {
            assert!(method.marker().ends_with(b" /"));
            assert!(method.marker().starts_with(method.to_string().as_bytes()));
        }
    }

    /// 各方法标记互不为前缀
    #[test]
    fn test_method_markers_are_exclusive() {
        for a in METHODS {
            for b in METHODS {
                if a != b {
                    assert!(!a.marker().starts_with(b.marker()));
                }
            }
        }
    }

    #[test]
    fn test_canned_pages_shape() {
        for (page, status) in [
            (RESPONSE_400, "400 Bad Request"),
            (RESPONSE_404, "404 Not Found"),
            (RESPONSE_405, "405 Method Not Allowed"),
            (RESPONSE_414, "414 URI Too Long"),
        ] {
            assert!(page.starts_with(&format!("HTTP/1.0 {}\r\n", status)));
            assert!(page.contains("Content-Type: text/html\r\n"));
            assert!(page.contains("Connection: close\r\n\r\n"));
            assert!(page.ends_with("</html>\n"));
        }
    }

    #[test]
    fn test_table_suffixes_are_lowercase() {
        for (suffix, _) in CLASSIFICATIONS {
            assert_eq!(*suffix, suffix.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_not_found_shares_html_type() {
        assert_eq!(Classification::NotFound.content_type(), "text/html");
        assert_eq!(Classification::OctetStream.to_string(), "application/octet-stream");
    }
}
