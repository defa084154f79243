// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协作式调度器
//!
//! 服务器本身不创建线程，也不会阻塞。宿主程序在主循环中反复调用 [`WebServer::service`]，
//! 每次调用完成三件事：
//! 1. 把等待中的新连接放入空闲的连接槽；
//! 2. 让当前轮到的连接推进一个阶段；
//! 3. 轮询指针移动到下一个活动连接。
//!
//! 连接槽数量 `N` 在编译期确定。`N == 1` 时每个分块最多一个完整帧，
//! 否则分块较小并对齐到扇区边界，让各连接公平地共享存储介质。

use log::{debug, error, info};

use crate::{
    callback::ServerCallback,
    config::Config,
    connection::{Phase, Slot},
    param::FRAME_SIZE,
    platform::{Listener, MemoryProbe, Storage},
};

/// 默认的连接槽数量
pub const DEFAULT_SLOTS: usize = 4;

pub struct WebServer<L, S, M, B, const N: usize = DEFAULT_SLOTS>
where
    L: Listener,
    S: Storage,
{
    listener: L,
    storage: S,
    memory: M,
    callback: B,
    config: Config,
    slots: [Slot<L::Client, S::File>; N],
    buffer: [u8; FRAME_SIZE],
    service_index: usize,
    next_id: u128,
}

/// 只有一个连接槽的服务器，适合内存极小的设备
pub type SingleStreamServer<L, S, M, B> = WebServer<L, S, M, B, 1>;

impl<L, S, M, B, const N: usize> WebServer<L, S, M, B, N>
where
    L: Listener,
    S: Storage,
    M: MemoryProbe,
    B: ServerCallback,
{
    /// 活动连接用 `u32` 位图表示
    const SLOT_COUNT_CHECK: () = assert!(N >= 1 && N <= 32, "slot count must be within 1..=32");

    pub fn new(listener: L, storage: S, memory: M, callback: B, config: Config) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SLOT_COUNT_CHECK;
        Self {
            listener,
            storage,
            memory,
            callback,
            config,
            slots: std::array::from_fn(|_| Slot::new()),
            buffer: [0u8; FRAME_SIZE],
            service_index: 0,
            next_id: 0,
        }
    }

    /// 检查监听端口与存储介质是否可用
    pub fn begin(&self) -> bool {
        if !self.listener.is_listening() {
            error!("监听端口不可用");
            return false;
        }
        if !self.storage.is_ready() {
            error!("存储介质不可用");
            return false;
        }
        info!(
            "服务器就绪：{}个连接槽，Web根目录{}",
            N,
            self.config.www_root()
        );
        true
    }

    /// 执行一次调度
    pub fn service(&mut self) {
        self.accept_connections();

        let slot = &mut self.slots[self.service_index];
        if slot.is_active() {
            slot.step(
                &mut self.storage,
                &mut self.callback,
                &self.memory,
                &self.config,
                &mut self.buffer,
                N > 1,
            );
        }

        self.advance_service_index();
    }

    /// 按槽位顺序接受新连接，监听端口没有更多连接时停止
    fn accept_connections(&mut self) {
        for i in 0..N {
            if self.slots[i].is_active() {
                continue;
            }
            let client = match self.listener.accept() {
                Some(c) => c,
                None => break,
            };
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            self.slots[i].open(client, id);
            info!("[ID{}]接受新连接，连接槽{}", id, i);

            // 唯一的活动连接马上得到服务
            if self.active_count() == 1 {
                self.service_index = i;
            }
        }
    }

    fn advance_service_index(&mut self) {
        let mask = self.active_mask();
        if mask == 0 {
            self.service_index = 0;
            return;
        }
        // offset == N 时回到当前槽位，即当前连接是唯一的活动连接
        for offset in 1..=N {
            let i = (self.service_index + offset) % N;
            if mask & (1 << i) != 0 {
                self.service_index = i;
                return;
            }
        }
    }

    /// 关闭所有活动连接
    pub fn shutdown(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| s.is_active()) {
            debug!("[ID{}]服务器关闭，结束连接", slot.id());
            slot.finalize();
        }
        self.service_index = 0;
    }
}

// --- Getter 访问器实现 ---

impl<L, S, M, B, const N: usize> WebServer<L, S, M, B, N>
where
    L: Listener,
    S: Storage,
{
    /// 活动连接位图，第 `i` 位对应第 `i` 个连接槽
    pub fn active_mask(&self) -> u32 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_active())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    pub fn service_index(&self) -> usize {
        self.service_index
    }

    pub fn slot_count(&self) -> usize {
        N
    }

    /// 槽位越界时返回 `Finished`
    pub fn phase(&self, index: usize) -> Phase {
        self.slots.get(index).map_or(Phase::Finished, |s| s.phase())
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.is_active())
    }

    pub fn pending_action(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.pending_action())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn callback(&self) -> &B {
        &self.callback
    }

    pub fn callback_mut(&mut self) -> &mut B {
        &mut self.callback
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }
}
