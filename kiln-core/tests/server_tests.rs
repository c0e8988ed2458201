//! Servers on loopback sockets

use async_trait::async_trait;
use kiln_config::ServerConfig;
use kiln_core::{
    AlwaysReject, Error, FnFilter, Generator, Handler, Request, Response, Server, StaticFilesConfig,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

use common::Reply;

fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.workers = 2;
    config.server.shutdown_grace_secs = 5;
    config
}

fn hello() -> Handler {
    Handler::builder("/hello")
        .respond(|_| Response::text("Hello World"))
        .build()
        .unwrap()
}

async fn request(addr: std::net::SocketAddr, raw: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn test_serves_over_tcp_and_shuts_down() {
    let server = Server::builder(config()).route(hello()).build().unwrap();
    let engine = server.engine().clone();
    let running = server.start().await.unwrap();
    let addr = running.local_addr();

    let reply = Reply::parse(&request(addr, "GET /hello HTTP/1.1\r\nHost: test\r\n\r\n").await);
    assert_eq!(reply.status, 200);
    assert_eq!(reply.text(), "Hello World");

    tokio::time::timeout(Duration::from_secs(5), running.shutdown())
        .await
        .expect("shutdown hung");
    assert_eq!(engine.metrics().requests_with_status(200), 1);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_filter_rejects_connections() {
    let server = Server::builder(config())
        .route(hello())
        .filter(AlwaysReject)
        .build()
        .unwrap();
    let engine = server.engine().clone();
    let running = server.start().await.unwrap();

    let mut stream = TcpStream::connect(running.local_addr()).await.unwrap();
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out).await;
    assert!(out.is_empty());
    assert_eq!(engine.metrics().rejected_connections(), 1);

    running.shutdown().await;
}

#[tokio::test]
async fn test_closure_filter_admits_loopback() {
    let server = Server::builder(config())
        .route(hello())
        .filter(FnFilter::new("loopback", |peer: std::net::SocketAddr| peer.ip().is_loopback()))
        .build()
        .unwrap();
    let running = server.start().await.unwrap();

    let reply = Reply::parse(&request(running.local_addr(), "GET /hello HTTP/1.1\r\n\r\n").await);
    assert_eq!(reply.status, 200);

    running.shutdown().await;
}

struct Slow;

#[async_trait]
impl Generator for Slow {
    async fn generate(&self, _request: &mut Request) -> kiln_core::Result<Option<Response>> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Some(Response::text("finally")))
    }
}

#[tokio::test]
async fn test_in_flight_request_completes_during_shutdown() {
    let server = Server::builder(config())
        .route(Handler::builder("/slow").generator(Slow).build().unwrap())
        .build()
        .unwrap();
    let running = server.start().await.unwrap();
    let addr = running.local_addr();

    let client = tokio::spawn(async move { request(addr, "GET /slow HTTP/1.1\r\n\r\n").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    running.shutdown().await;

    let reply = Reply::parse(&client.await.unwrap());
    assert_eq!(reply.status, 200);
    assert_eq!(reply.text(), "finally");
}

#[tokio::test]
async fn test_duplicate_route_fails_build() {
    let result = Server::builder(config()).route(hello()).route(hello()).build();
    assert!(matches!(result, Err(Error::DuplicateRoute { .. })));
}

#[tokio::test]
async fn test_port_in_use_is_fatal() {
    let first = Server::builder(config()).build().unwrap().start().await.unwrap();

    let mut taken = config();
    taken.server.port = first.local_addr().port();
    let second = Server::builder(taken).build().unwrap().start().await;
    assert!(matches!(second, Err(Error::Bind { .. })));

    first.shutdown().await;
}

#[tokio::test]
async fn test_static_files_through_builder() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("note.txt"), "from disk").unwrap();

    let server = Server::builder(config())
        .static_files(StaticFilesConfig::new(dir.path()))
        .build()
        .unwrap();
    let running = server.start().await.unwrap();

    let reply = Reply::parse(&request(running.local_addr(), "GET /note.txt HTTP/1.1\r\n\r\n").await);
    assert_eq!(reply.text(), "from disk");

    running.shutdown().await;
}

#[tokio::test]
async fn test_missing_static_root_fails_build() {
    let result = Server::builder(config())
        .static_files(StaticFilesConfig::new("/no/such/kiln/root"))
        .build();
    assert!(matches!(result, Err(Error::StaticFiles(_))));
}
