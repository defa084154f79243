//! # 扩展回调
//!
//! 请求处理分为四个阶段，其中两个由回调提供：
//!
//! 1. 如果请求带有表单参数（GET 查询字符串或 POST 请求体），先交给回调处理。
//! 2. 服务器根据文件后缀生成并发送 HTTP 响应头。
//! 3. 对于可变文件，回调可以在文件发送之前检查甚至改写响应内容。
//! 4. 服务器把文件剩余部分（通常是全部）分块发回客户端。
//!
//! 所有方法都有宽松的默认实现，[`DefaultCallback`] 什么也不做。

use log::{debug, warn};

use crate::param::POST_BUFFER_CAPACITY;
use crate::platform::{Client, WebFile};

pub trait ServerCallback {
    /// GET 请求的查询字符串（仍是 URL 编码的）。可以用
    /// [`next_query_pair`](crate::util::next_query_pair) 拆分为名称/值对。
    ///
    /// 返回 `false` 时服务器向客户端报告 400 Bad Request。
    fn process_form_data(&mut self, _path: &str, _query: &mut [u8]) -> bool {
        true
    }

    /// POST 请求的请求体。默认实现最多读取 `POST_BUFFER_CAPACITY` 字节，
    /// 然后作为查询字符串交给 [`process_form_data`](Self::process_form_data)。
    /// 请求体更长时请覆盖此方法，自己从 `client` 中读取。
    fn process_body_data(
        &mut self,
        path: &str,
        client: &mut dyn Client,
        content_length: u64,
    ) -> bool {
        let mut buffer = [0u8; POST_BUFFER_CAPACITY];
        let wanted = usize::try_from(content_length)
            .map_or(POST_BUFFER_CAPACITY, |n| n.min(POST_BUFFER_CAPACITY));
        if (wanted as u64) < content_length {
            warn!("POST请求体有{}字节，默认处理器只读取前{}字节", content_length, wanted);
        }

        let mut len = 0;
        while len < wanted {
            match client.read() {
                Some(c) => {
                    buffer[len] = c;
                    len += 1;
                }
                None => break,
            }
        }
        debug!("读取了{}字节的POST数据", len);
        self.process_form_data(path, &mut buffer[..len])
    }

    /// 文件是否允许在发送前由 [`file_action`](Self::file_action) 处理。只读文件永远不会被询问。
    fn is_mutable(&mut self, _path: &str) -> bool {
        false
    }

    /// 在响应头发出之后、文件发出之前调用。回调读取但不想丢弃的内容必须自己写给客户端。
    ///
    /// 返回 `true` 时会在下一次调度中再次被调用，返回 `false` 后服务器接手发送文件剩余部分。
    fn file_action(&mut self, _client: &mut dyn Client, _file: &mut dyn WebFile) -> bool {
        false
    }
}

/// 不做任何额外处理的回调
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCallback;

impl ServerCallback for DefaultCallback {}
