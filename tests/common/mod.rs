//! In-process mock edge nodes for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use edgescout::config::ScanConfig;
use edgescout::probes::TRACE_USER_AGENT;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Behaviour of one mock edge node.
#[derive(Clone)]
pub struct MockEdge {
    /// Facility code reported by `/cdn-cgi/trace`.
    pub colo: &'static str,
    /// Size of the speed-test payload served on any other path.
    pub payload: usize,
    /// Pause after each 64 KiB payload chunk.
    pub chunk_delay: Duration,
}

impl MockEdge {
    pub fn new(colo: &'static str) -> Self {
        Self {
            colo,
            payload: 1024 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }
}

pub fn trace_body(colo: &str) -> String {
    format!(
        "fl=1\nh=www.speedtest.net\nip=192.0.2.1\nuag={TRACE_USER_AGENT}\ncolo={colo}\nhttp=http/1.1\n"
    )
}

async fn read_request_line(sock: &mut TcpStream) -> Option<String> {
    let mut buf = [0u8; 2048];
    let mut seen = Vec::new();
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match sock.read(&mut buf).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
    let text = String::from_utf8_lossy(&seen);
    text.lines().next().map(str::to_string)
}

async fn handle(mut sock: TcpStream, edge: MockEdge) {
    let Some(request_line) = read_request_line(&mut sock).await else {
        return;
    };
    let path = request_line.split_whitespace().nth(1).unwrap_or("/");

    if path == "/cdn-cgi/trace" {
        let body = trace_body(edge.colo);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = sock.write_all(response.as_bytes()).await;
        let _ = sock.shutdown().await;
        return;
    }

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        edge.payload
    );
    if sock.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let chunk = vec![0u8; 64 * 1024];
    let mut sent = 0;
    while sent < edge.payload {
        let n = chunk.len().min(edge.payload - sent);
        if sock.write_all(&chunk[..n]).await.is_err() {
            return;
        }
        sent += n;
        if !edge.chunk_delay.is_zero() {
            tokio::time::sleep(edge.chunk_delay).await;
        }
    }
    let _ = sock.shutdown().await;
}

/// Start a mock edge on a loopback port and return the port.
pub async fn spawn_edge(edge: MockEdge) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            tokio::spawn(handle(sock, edge.clone()));
        }
    });
    port
}

/// A loopback port with nothing listening.
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn write_locations(dir: &Path) -> PathBuf {
    let path = dir.join("locations.json");
    std::fs::write(
        &path,
        r#"[
            {"iata": "ABC", "lat": 1.0, "lon": 2.0, "cca2": "US", "region": "North America", "city": "Abc City"},
            {"iata": "DEF", "lat": 3.0, "lon": 4.0, "cca2": "DE", "region": "Europe", "city": "Def Town"}
        ]"#,
    )
    .unwrap();
    path
}

/// Config pointing every path into `dir`, with `candidates` as the input.
pub fn scan_config(dir: &Path, candidates: &str) -> ScanConfig {
    let input = dir.join("ip.txt");
    std::fs::write(&input, candidates).unwrap();

    let mut cfg = ScanConfig::default();
    cfg.input.candidates = input;
    cfg.input.output = dir.join("ip.csv");
    cfg.locations.cache = write_locations(dir);
    cfg.locations.url = "http://127.0.0.1:9/locations".to_string();
    cfg.probe.raise_nofile = false;
    cfg.speed.url = "speed.example.net/__down?bytes=1048576".to_string();
    cfg
}

/// CSV rows of the export, BOM and header stripped.
pub fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let bytes = std::fs::read(path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"), "export must start with a BOM");
    let mut rdr = csv::Reader::from_reader(&bytes[3..]);
    rdr.records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}
