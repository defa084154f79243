//! 端到端测试：服务器运行在本机回环地址的真实 TCP 端口上，
//! 客户端在独立线程中发送请求并读取完整响应。

use std::{
    fs,
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use coopweb::{
    host::{FsStorage, TcpTransport},
    Config, DefaultCallback, FixedMemory, WebServer,
};
use tempfile::TempDir;

type HostServer = WebServer<TcpTransport, FsStorage, FixedMemory, DefaultCallback>;

fn start_server() -> (HostServer, SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("WWW")).unwrap();
    fs::write(dir.path().join("WWW/index.html"), "<h1>coopweb</h1>").unwrap();

    let transport = TcpTransport::bind("127.0.0.1:0").unwrap();
    let addr = transport.local_addr().unwrap();
    let server = WebServer::new(
        transport,
        FsStorage::new(dir.path()),
        FixedMemory(4096),
        DefaultCallback,
        Config::new(),
    );
    assert!(server.begin());
    (server, addr, dir)
}

fn send_request(addr: SocketAddr, request: &str) -> JoinHandle<Result<Vec<u8>, String>> {
    send_request_read_later(addr, request, Duration::ZERO)
}

/// 发送请求后等待 `delay` 才开始读取响应，模拟慢速客户端
fn send_request_read_later(
    addr: SocketAddr,
    request: &str,
    delay: Duration,
) -> JoinHandle<Result<Vec<u8>, String>> {
    let request = request.to_string();
    thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).map_err(|e| e.to_string())?;
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .map_err(|e| e.to_string())?;
        stream.write_all(request.as_bytes()).map_err(|e| e.to_string())?;
        thread::sleep(delay);
        let mut response = Vec::new();
        stream.read_to_end(&mut response).map_err(|e| e.to_string())?;
        Ok(response)
    })
}

/// 在当前线程中调度服务器，直到所有客户端线程结束
fn serve_until_done(
    server: &mut HostServer,
    clients: Vec<JoinHandle<Result<Vec<u8>, String>>>,
) -> Vec<Vec<u8>> {
    let deadline = Instant::now() + Duration::from_secs(20);
    while clients.iter().any(|c| !c.is_finished()) {
        assert!(Instant::now() < deadline, "客户端在20秒内没有收到完整响应");
        server.service();
    }
    clients
        .into_iter()
        .map(|c| c.join().unwrap().unwrap())
        .collect()
}

fn parse_response(response: &[u8]) -> (u16, Vec<(String, String)>, Vec<u8>) {
    let end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map_or(response.len(), |p| p + 4);
    let head = String::from_utf8_lossy(&response[..end]).to_string();
    let mut lines = head.split("\r\n");

    // 解析状态行
    let status_code = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);

    // 解析头部
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    (status_code, headers, response[end..].to_vec())
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[test]
fn test_get_request_basic() {
    let (mut server, addr, _dir) = start_server();
    let client = send_request(addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let responses = serve_until_done(&mut server, vec![client]);

    let (status, headers, body) = parse_response(&responses[0]);
    assert_eq!(status, 200);
    assert_eq!(header(&headers, "Server"), Some("coopweb/1.0"));
    assert_eq!(header(&headers, "Content-Type"), Some("text/html"));
    assert_eq!(header(&headers, "Content-Length"), Some("16"));
    assert_eq!(header(&headers, "Connection"), Some("close"));
    assert_eq!(body, b"<h1>coopweb</h1>");
}

#[test]
fn test_head_request() {
    let (mut server, addr, _dir) = start_server();
    let client = send_request(addr, "HEAD /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let responses = serve_until_done(&mut server, vec![client]);

    let (status, headers, body) = parse_response(&responses[0]);
    assert_eq!(status, 200);
    assert_eq!(header(&headers, "Content-Length"), Some("16"));
    assert!(body.is_empty());
}

#[test]
fn test_not_found_with_custom_page() {
    let (mut server, addr, dir) = start_server();
    fs::write(dir.path().join("WWW/404.html"), "<p>lost</p>").unwrap();
    let client = send_request(addr, "GET /nothing.png HTTP/1.0\r\n\r\n");
    let responses = serve_until_done(&mut server, vec![client]);

    let (status, headers, body) = parse_response(&responses[0]);
    assert_eq!(status, 404);
    assert_eq!(header(&headers, "Content-Length"), None);
    assert_eq!(body, b"<p>lost</p>");
}

#[test]
fn test_unsupported_method() {
    let (mut server, addr, _dir) = start_server();
    let client = send_request(addr, "OPTIONS * HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let responses = serve_until_done(&mut server, vec![client]);
    assert_eq!(parse_response(&responses[0]).0, 405);
}

/// 大文件分为许多块发送，内容逐字节一致
#[test]
fn test_large_file_transfer() {
    let (mut server, addr, dir) = start_server();
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();
    fs::write(dir.path().join("WWW/firmware.bin"), &data).unwrap();

    let client = send_request(addr, "GET /firmware.bin HTTP/1.0\r\n\r\n");
    let responses = serve_until_done(&mut server, vec![client]);

    let (status, headers, body) = parse_response(&responses[0]);
    assert_eq!(status, 200);
    assert_eq!(header(&headers, "Content-Type"), Some("application/octet-stream"));
    assert_eq!(header(&headers, "Content-Length"), Some("200000"));
    assert_eq!(body.len(), data.len());
    assert!(body == data);
}

/// 多个客户端同时下载，各自得到完整的文件
#[test]
fn test_concurrent_clients() {
    let (mut server, addr, dir) = start_server();
    let data: Vec<u8> = (0..30_000u32).map(|i| (i % 199) as u8).collect();
    fs::write(dir.path().join("WWW/data.csv"), &data).unwrap();

    let clients = (0..6)
        .map(|_| send_request(addr, "GET /data.csv HTTP/1.0\r\n\r\n"))
        .collect();
    let responses = serve_until_done(&mut server, clients);

    for response in responses {
        let (status, headers, body) = parse_response(&response);
        assert_eq!(status, 200);
        assert_eq!(header(&headers, "Content-Type"), Some("text/csv"));
        assert!(body == data);
    }
    assert_eq!(server.active_mask(), 0);
}

/// 客户端迟迟不读取时套接字被写满，服务器应当等待而不是丢弃数据，
/// 同时每次调度都立即返回
#[test]
fn test_slow_reader_receives_complete_file() {
    let (mut server, addr, dir) = start_server();
    let data: Vec<u8> = (0..8_000_000u32).map(|i| (i % 241) as u8).collect();
    fs::write(dir.path().join("WWW/image.bin"), &data).unwrap();

    let client = send_request_read_later(
        addr,
        "GET /image.bin HTTP/1.0\r\n\r\n",
        Duration::from_secs(2),
    );

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut slowest = Duration::ZERO;
    while !client.is_finished() {
        assert!(Instant::now() < deadline, "慢速客户端在30秒内没有收到完整响应");
        let started = Instant::now();
        server.service();
        slowest = slowest.max(started.elapsed());
    }
    let response = client.join().unwrap().unwrap();

    let (status, headers, body) = parse_response(&response);
    assert_eq!(status, 200);
    assert_eq!(header(&headers, "Content-Length"), Some("8000000"));
    assert_eq!(body.len(), data.len());
    assert!(body == data);
    assert!(slowest < Duration::from_secs(1), "一次调度耗时{:?}", slowest);
}
