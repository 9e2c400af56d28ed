//! Helpers for tests that run a real server on a loopback port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use beacon::server::stats::ServerStats;
use beacon::{Server, ServerConfig, ShutdownHandle, SseRegistry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Loopback config with an ephemeral port and short timers.
pub fn config() -> ServerConfig {
    ServerConfig {
        port: 0,
        keep_alive_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(300),
        sse_ping_interval: Duration::from_millis(150),
        ..ServerConfig::default()
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ShutdownHandle,
    pub registry: Arc<SseRegistry>,
    pub stats: Arc<ServerStats>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn client(&self) -> Client {
        Client::connect(self.addr).await
    }

    /// Polls `cond` until it holds or a few seconds pass.
    pub async fn wait_until(&self, cond: impl Fn(&TestServer) -> bool) -> bool {
        for _ in 0..100 {
            if cond(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        self.task.abort();
    }
}

pub async fn spawn(server: Server) -> TestServer {
    let registry = server.registry();
    let stats = server.stats();
    let bound = server.bind().await.expect("bind test server");
    let addr = bound.local_addr();
    let handle = bound.shutdown_handle();
    let task = tokio::spawn(async move {
        bound.run().await.expect("server run");
    });

    TestServer {
        addr,
        handle,
        registry,
        stats,
        task,
    }
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A raw TCP client that keeps bytes read past one response for the next.
pub struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn send(&mut self, bytes: impl AsRef<[u8]>) {
        self.stream.write_all(bytes.as_ref()).await.expect("write");
    }

    async fn fill(&mut self) -> usize {
        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(READ_TIMEOUT, self.stream.read(&mut chunk))
            .await
            .expect("read timed out")
            .unwrap_or(0);
        self.buf.extend_from_slice(&chunk[..n]);
        n
    }

    pub async fn read_response(&mut self) -> RawResponse {
        let head_end = loop {
            if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            assert!(self.fill().await > 0, "connection closed before response head");
        };

        let head = String::from_utf8(self.buf[..head_end].to_vec()).expect("utf-8 head");
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let status = status_line
            .split(' ')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status code");
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        let length: usize = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);

        let total = head_end + 4 + length;
        while self.buf.len() < total {
            assert!(self.fill().await > 0, "connection closed before response body");
        }

        let body = self.buf[head_end + 4..total].to_vec();
        self.buf.drain(..total);

        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Reads until `needle` appears and returns everything up to and
    /// including it.
    pub async fn read_until(&mut self, needle: &str) -> String {
        let needle = needle.as_bytes();
        loop {
            if let Some(pos) = self.buf.windows(needle.len()).position(|w| w == needle) {
                let taken: Vec<u8> = self.buf.drain(..pos + needle.len()).collect();
                return String::from_utf8_lossy(&taken).into_owned();
            }
            assert!(self.fill().await > 0, "connection closed while waiting for data");
        }
    }

    /// True once the server has closed its end.
    pub async fn is_closed(&mut self) -> bool {
        if !self.buf.is_empty() {
            return false;
        }
        let mut chunk = [0u8; 64];
        match tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            Ok(Ok(n)) => {
                self.buf.extend_from_slice(&chunk[..n]);
                false
            }
            Err(_) => false,
        }
    }

    /// Closes the client side.
    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
