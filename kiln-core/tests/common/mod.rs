//! Helpers shared by the integration tests

#![allow(dead_code)]

use kiln_core::{Engine, Outcome, Worker};
use kiln_metrics::ServerMetrics;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn parse(raw: &[u8]) -> Self {
        let split = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .expect("response head");
        let head = std::str::from_utf8(&raw[..split]).unwrap();
        let mut lines = head.split("\r\n");
        let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
        let headers = lines
            .map(|line| {
                let (name, value) = line.split_once(": ").unwrap();
                (name.to_ascii_lowercase(), value.to_string())
            })
            .collect();
        Self {
            status,
            headers,
            body: raw[split + 4..].to_vec(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

pub fn engine() -> Engine {
    Engine::new(ServerMetrics::new().unwrap())
}

pub async fn exchange(engine: &Engine, raw: &[u8]) -> (Outcome, Vec<u8>) {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    client.write_all(raw).await.unwrap();

    let mut worker = Worker::new(0);
    let outcome = worker.serve(engine, server, None).await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    (outcome, out)
}

/// Like [`exchange`], for a connection that arrived over TLS
pub async fn exchange_secure(engine: &Engine, raw: &[u8]) -> (Outcome, Vec<u8>) {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    client.write_all(raw).await.unwrap();

    let mut worker = Worker::new(0);
    let outcome = worker.serve_secure(engine, server, None).await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    (outcome, out)
}

pub async fn get(engine: &Engine, path: &str) -> Reply {
    let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
    let (_, out) = exchange(engine, raw.as_bytes()).await;
    Reply::parse(&out)
}
