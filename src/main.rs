// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 宿主程序
//!
//! 在普通操作系统上运行协作式 Web 服务器：
//! - 从 `config/development.toml` 载入配置，从 `config/log4rs.yaml` 载入日志配置；
//! - 在单线程 Tokio 运行时中按固定间隔驱动调度器；
//! - 提供后台管理控制台（`stop`、`status`、`help`）。

use std::time::Duration;

use coopweb::{
    host::{FsStorage, TcpTransport},
    Config, DefaultCallback, FixedMemory, WebServer,
};

use log::{error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config as LogConfig, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
    time::{interval, MissedTickBehavior},
};

type HostServer = WebServer<TcpTransport, FsStorage, FixedMemory, DefaultCallback>;

fn main() {
    // 1. 初始化日志系统
    init_logging();

    // 2. 环境配置加载
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    // 3. 调度器只需要一个线程
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            return;
        }
    };
    runtime.block_on(run(config));
}

/// 载入日志配置文件，失败时退回到只输出到控制台的默认配置
fn init_logging() {
    let e = match log4rs::init_file("config/log4rs.yaml", Default::default()) {
        Ok(()) => return,
        Err(e) => e,
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
        )))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match config.map(log4rs::init_config) {
        Ok(Ok(_)) => warn!("无法载入config/log4rs.yaml（{}），使用默认日志配置", e),
        _ => eprintln!("日志系统初始化失败：{}", e),
    }
}

async fn run(config: Config) {
    // 4. 网络层与存储介质初始化
    let port = config.port();
    let transport = match TcpTransport::from_config(&config) {
        Ok(transport) => transport,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    if let Ok(addr) = transport.local_addr() {
        info!("服务端将在{}上监听Socket连接", addr);
    }
    let storage = FsStorage::from_config(&config);
    let memory = FixedMemory(config.memory_ceiling());
    let tick = Duration::from_millis(config.tick_interval_ms().max(1));

    let mut server: HostServer =
        WebServer::new(transport, storage, memory, DefaultCallback, config);
    if !server.begin() {
        error!("服务器无法启动，请检查storage_root与www_root配置");
        return;
    }

    // 5. 主循环：定时调度，同时响应管理控制台指令
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => server.service(),
            line = console.next_line(), if console_open => match line {
                Ok(Some(input)) => {
                    if !handle_command(input.trim(), &server) {
                        break;
                    }
                }
                // 标准输入已关闭（例如作为后台进程运行），只继续调度
                _ => console_open = false,
            },
        }
    }

    server.shutdown();
    info!("服务器已关闭");
}

/// 执行控制台指令，返回 `false` 表示应当停机
fn handle_command(cmd: &str, server: &HostServer) -> bool {
    match cmd {
        "stop" => {
            println!("停机指令已激活，服务器将关闭所有连接后退出...");
            return false;
        }
        "help" => {
            println!("== Webserver Help ==");
            println!("stop   - 关闭所有连接并退出");
            println!("status - 查看当前服务器运行状态");
            println!("help   - 显示此帮助信息");
            println!("====================");
        }
        "status" => {
            println!("== Webserver 状态 ===");
            println!("当前活跃连接数: {}/{}", server.active_count(), server.slot_count());
            println!("活动连接位图: {:#034b}", server.active_mask());
            println!("当前轮询位置: {}", server.service_index());
            println!("====================");
        }
        "" => {}
        _ => println!("无效的命令：{}", cmd),
    }
    true
}
