//! Shared harness: a live server on an ephemeral port plus a raw-byte
//! client, so tests speak actual HTTP/1.1 over actual sockets.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use restling::config::ServerConfig;
use restling::router::RestServer;
use restling::server::Server;

pub struct TestServer {
    pub core: Arc<Server>,
    pub addr: SocketAddr,
}

impl TestServer {
    /// Start a server with shortened timeouts and the given endpoints.
    pub fn start(configure: impl FnOnce(&mut RestServer)) -> Self {
        Self::start_with_config(short_timeouts(), configure)
    }

    pub fn start_with_config(
        config: ServerConfig,
        configure: impl FnOnce(&mut RestServer),
    ) -> Self {
        let mut server =
            RestServer::bind("127.0.0.1:0", "TestServer", config).expect("bind test server");
        configure(&mut server);
        let core = server.core();
        let addr = core.local_addr().expect("local addr");
        thread::spawn(move || server.start());
        wait_ready(addr);
        TestServer { core, addr }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        stream
    }

    /// One-shot exchange: write the request, read until the server closes.
    pub fn exchange(&self, request: &[u8]) -> Vec<u8> {
        let mut stream = self.connect();
        stream.write_all(request).expect("write request");
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response);
        response
    }

    /// Let the event thread fold pending session statistics into totals.
    pub fn settle(&self) {
        thread::sleep(Duration::from_millis(300));
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.core.stop();
    }
}

/// Test timeouts: fast idle close, scratch files under the temp dir.
pub fn short_timeouts() -> ServerConfig {
    ServerConfig {
        idle_timeout: Duration::from_millis(400),
        receive_timeout: Duration::from_secs(5),
        scratch_dir: std::env::temp_dir().join(format!("restling-tests-{}", std::process::id())),
        ..ServerConfig::default()
    }
}

fn wait_ready(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("server on {addr} never became ready");
}

/// A response as read off the wire, split for assertions.
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }
}

/// Read exactly one response from the stream: head up to `CRLF CRLF`, then
/// a Content-Length-delimited body.
pub fn read_response(stream: &mut TcpStream) -> RawResponse {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).expect("response head");
        head.push(byte[0]);
    }

    let head = String::from_utf8(head).expect("ASCII head");
    let mut lines = head.split("\r\n");
    let status_line = lines.next().expect("status line");
    let mut parts = status_line.splitn(3, ' ');
    parts.next().expect("version");
    let status: u16 = parts.next().expect("code").parse().expect("numeric code");
    let reason = parts.next().unwrap_or("").to_string();

    let headers: Vec<(String, String)> = lines
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    let length: usize = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse().expect("numeric content-length"))
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).expect("response body");

    RawResponse {
        status,
        reason,
        headers,
        body,
    }
}
