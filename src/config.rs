use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::exception::ErrorPolicy;
use crate::param::{DEFAULT_DOCUMENT, DEFAULT_WEB_ROOT, REQUEST_LINE_CAPACITY};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    www_root: String,
    #[serde(default = "default_storage_root")]
    storage_root: String,
    port: u16,
    local: bool,
    #[serde(default = "default_error_policy")]
    error_policy: ErrorPolicy,
    #[serde(default = "default_true")]
    allow_post: bool,
    #[serde(default = "default_true")]
    allow_mutable: bool,
    #[serde(default = "default_memory_ceiling")]
    memory_ceiling: usize,
    #[serde(default = "default_tick_interval_ms")]
    tick_interval_ms: u64,
}

fn default_storage_root() -> String {
    ".".to_string()
}

fn default_error_policy() -> ErrorPolicy {
    ErrorPolicy::Full
}

fn default_true() -> bool {
    true
}

fn default_memory_ceiling() -> usize {
    2048 // 2KB
}

fn default_tick_interval_ms() -> u64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: DEFAULT_WEB_ROOT.to_string(),
            storage_root: default_storage_root(),
            port: 7878,
            local: true,
            error_policy: default_error_policy(),
            allow_post: true,
            allow_mutable: true,
            memory_ceiling: default_memory_ceiling(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }

    /// 精简配置：只支持 GET/HEAD，所有错误都报告为 404，所有文件都不可变。
    pub fn lean() -> Self {
        Self {
            error_policy: ErrorPolicy::NotFoundOnly,
            allow_post: false,
            allow_mutable: false,
            ..Self::new()
        }
    }

    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件{}：{}，使用默认配置", filename, e);
                return Config::new();
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}失败：{}，使用默认配置", filename, e);
            return Config::new();
        }

        let raw_config: Config = match toml::from_str(&str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象（{}），使用默认配置", e);
                Config::new()
            }
        };
        raw_config.normalized()
    }

    /// 规范化 Web 根目录：去掉末尾的 `/`，过长时回退到默认值。
    fn normalized(mut self) -> Self {
        while self.www_root.ends_with('/') {
            self.www_root.pop();
        }
        // 根目录加上最短的请求 "/" 与默认文档名必须能放进请求行缓冲区
        if self.www_root.len() + 1 + DEFAULT_DOCUMENT.len() >= REQUEST_LINE_CAPACITY {
            warn!(
                "www_root过长（{}字节），请求行缓冲区只有{}字节，改用{}",
                self.www_root.len(),
                REQUEST_LINE_CAPACITY,
                DEFAULT_WEB_ROOT
            );
            self.www_root = DEFAULT_WEB_ROOT.to_string();
        }
        if self.memory_ceiling == 0 {
            warn!(
                "memory_ceiling被设置为0，文件将永远无法发送，该值将被改为{}",
                default_memory_ceiling()
            );
            self.memory_ceiling = default_memory_ceiling();
        }
        self
    }
}

impl Config {
    pub fn with_www_root(mut self, root: &str) -> Self {
        self.www_root = root.to_string();
        self.normalized()
    }

    pub fn with_storage_root(mut self, root: &str) -> Self {
        self.storage_root = root.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_post(mut self, allow: bool) -> Self {
        self.allow_post = allow;
        self
    }

    pub fn with_mutable_files(mut self, allow: bool) -> Self {
        self.allow_mutable = allow;
        self
    }

    pub fn with_memory_ceiling(mut self, bytes: usize) -> Self {
        self.memory_ceiling = bytes;
        self.normalized()
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn storage_root(&self) -> &str {
        &self.storage_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn allow_post(&self) -> bool {
        self.allow_post
    }

    pub fn allow_mutable(&self) -> bool {
        self.allow_mutable
    }

    pub fn memory_ceiling(&self) -> usize {
        self.memory_ceiling
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }
}
