//! # 文件分块传输
//!
//! 每次调度只发送一个分块。分块大小取以下各项的最小值：
//! - 发送缓冲区的剩余空间；
//! - 单连接时为一个以太网帧，多连接时为两个扇区，并且分块结束位置对齐到扇区边界；
//! - 当前空闲内存减去栈安全余量；
//! - 文件剩余字节数。
//!
//! 传输缓冲区由服务器持有，大小固定为一个帧。

use log::{debug, trace, warn};

use crate::param::*;
use crate::platform::{Client, MemoryProbe, WebFile};

/// 一次分块发送的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// 发送了若干字节，文件可能还有剩余
    Sent(usize),
    /// 发送缓冲区或内存不足，本次没有发送任何数据
    Blocked,
    /// 文件已经没有可发送的数据
    Complete,
}

/// 计算本次可以发送的分块大小
pub fn chunk_limit(
    write_space: usize,
    position: u64,
    remaining: u64,
    free_memory: usize,
    multi_stream: bool,
) -> usize {
    let ceiling = if multi_stream {
        // 存储介质按扇区读取，让分块在扇区边界结束
        MULTI_STREAM_CHUNK - (position % SECTOR_SIZE as u64) as usize
    } else {
        FRAME_SIZE
    };
    let memory = free_memory.saturating_sub(STACK_MARGIN);
    let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
    write_space.min(ceiling).min(memory).min(remaining)
}

/// 发送文件的下一个分块。空闲内存在每次发送前重新查询。
pub fn send_chunk<C, F, M>(
    client: &mut C,
    file: &mut F,
    buffer: &mut [u8; FRAME_SIZE],
    memory: &M,
    multi_stream: bool,
    id: u128,
) -> Transfer
where
    C: Client + ?Sized,
    F: WebFile + ?Sized,
    M: MemoryProbe + ?Sized,
{
    let remaining = file.available();
    if remaining == 0 {
        return Transfer::Complete;
    }

    let limit = chunk_limit(
        client.available_for_write(),
        file.position(),
        remaining,
        memory.free_memory(),
        multi_stream,
    );
    if limit == 0 {
        trace!("[ID{}]发送缓冲区或内存不足，等待下一次调度", id);
        return Transfer::Blocked;
    }

    let read = file.read(&mut buffer[..limit]);
    if read == 0 {
        warn!("[ID{}]文件还剩{}字节，但读取不到任何数据", id, remaining);
        return Transfer::Complete;
    }
    let written = client.write(&buffer[..read]);
    if written < read {
        warn!("[ID{}]只写入了{}/{}字节", id, written, read);
    }
    debug!("[ID{}]发送了{}字节，剩余{}字节", id, read, file.available());
    Transfer::Sent(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackClient, MemStorage};
    use crate::platform::{FixedMemory, MockMemoryProbe, Storage};
    use std::cell::Cell;

    #[test]
    fn test_single_stream_uses_full_frame() {
        assert_eq!(chunk_limit(4096, 0, 10_000, 4096, false), FRAME_SIZE);
        assert_eq!(chunk_limit(4096, 700, 10_000, 4096, false), FRAME_SIZE);
    }

    /// 多连接时分块在扇区边界结束
    #[test]
    fn test_multi_stream_sector_alignment() {
        assert_eq!(chunk_limit(4096, 0, 10_000, 4096, true), 1024);
        assert_eq!(chunk_limit(4096, 100, 10_000, 4096, true), 924);
        assert_eq!(chunk_limit(4096, 512, 10_000, 4096, true), 1024);
        assert_eq!(chunk_limit(4096, 1023, 10_000, 4096, true), 513);
        let pos = 100 + 924;
        assert_eq!(pos % SECTOR_SIZE, 0);
    }

    #[test]
    fn test_limit_by_each_factor() {
        assert_eq!(chunk_limit(300, 0, 10_000, 4096, false), 300);
        assert_eq!(chunk_limit(4096, 0, 10_000, 600, false), 500);
        assert_eq!(chunk_limit(4096, 0, 42, 4096, false), 42);
    }

    /// 空闲内存低于栈安全余量时不发送
    #[test]
    fn test_memory_below_margin() {
        assert_eq!(chunk_limit(4096, 0, 10_000, STACK_MARGIN, false), 0);
        assert_eq!(chunk_limit(4096, 0, 10_000, 10, false), 0);
    }

    #[test]
    fn test_send_chunk_until_complete() {
        let (mut client, peer) = LoopbackClient::pair();
        let mut storage = MemStorage::new();
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        storage.insert("/WWW/big.bin", &data, true);
        let mut file = storage.open("/WWW/big.bin").unwrap();
        let mut buffer = [0u8; FRAME_SIZE];
        let memory = FixedMemory(8192);

        let mut sizes = Vec::new();
        loop {
            match send_chunk(&mut client, &mut file, &mut buffer, &memory, false, 0) {
                Transfer::Sent(n) => sizes.push(n),
                Transfer::Complete => break,
                Transfer::Blocked => panic!("unexpected block"),
            }
        }
        assert_eq!(sizes, vec![1400, 1400, 200]);
        assert_eq!(peer.received(), data);
    }

    #[test]
    fn test_send_chunk_blocked_without_write_space() {
        let (mut client, peer) = LoopbackClient::pair();
        peer.set_write_window(0);
        let mut storage = MemStorage::new();
        storage.insert("/WWW/a.txt", b"hello", true);
        let mut file = storage.open("/WWW/a.txt").unwrap();
        let mut buffer = [0u8; FRAME_SIZE];

        let result = send_chunk(&mut client, &mut file, &mut buffer, &FixedMemory(8192), false, 0);
        assert_eq!(result, Transfer::Blocked);
        assert_eq!(file.position(), 0);
        assert_eq!(storage.read_calls(), 0);
    }

    /// 每个分块之前都查询一次空闲内存，内存紧张时分块随之变小
    #[test]
    fn test_memory_probed_before_every_chunk() {
        let (mut client, peer) = LoopbackClient::pair();
        let mut storage = MemStorage::new();
        storage.insert("/WWW/a.bin", &[7u8; 1000], true);
        let mut file = storage.open("/WWW/a.bin").unwrap();
        let mut buffer = [0u8; FRAME_SIZE];

        let calls = Cell::new(0usize);
        let mut probe = MockMemoryProbe::new();
        probe.expect_free_memory().times(3).returning(move || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                STACK_MARGIN + 400
            } else {
                4096
            }
        });

        assert_eq!(
            send_chunk(&mut client, &mut file, &mut buffer, &probe, false, 0),
            Transfer::Sent(400)
        );
        assert_eq!(
            send_chunk(&mut client, &mut file, &mut buffer, &probe, false, 0),
            Transfer::Sent(600)
        );
        // 文件已经发送完毕时不再查询内存
        assert_eq!(
            send_chunk(&mut client, &mut file, &mut buffer, &probe, false, 0),
            Transfer::Complete
        );
        assert_eq!(peer.write_sizes(), vec![400, 600]);

        // 第三次查询发生在下一个文件上
        storage.insert("/WWW/b.bin", &[1u8; 10], true);
        let mut next = storage.open("/WWW/b.bin").unwrap();
        assert_eq!(
            send_chunk(&mut client, &mut next, &mut buffer, &probe, false, 0),
            Transfer::Sent(10)
        );
    }

    #[test]
    fn test_probe_never_called_for_empty_file() {
        let (mut client, _peer) = LoopbackClient::pair();
        let mut storage = MemStorage::new();
        storage.insert("/WWW/empty.txt", b"", true);
        let mut file = storage.open("/WWW/empty.txt").unwrap();
        let mut buffer = [0u8; FRAME_SIZE];

        let mut probe = MockMemoryProbe::new();
        probe.expect_free_memory().never();
        assert_eq!(
            send_chunk(&mut client, &mut file, &mut buffer, &probe, true, 0),
            Transfer::Complete
        );
    }
}
