//! ---
//! rovlink_section: "15-testing-qa-runbook"
//! rovlink_subsection: "integration-test"
//! rovlink_type: "test"
//! rovlink_scope: "code"
//! rovlink_description: "Control endpoint behaviour over raw HTTP/1.1 connections."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rovlink_msg::CommandLine;
use rovlink_transmitter::{CommandSink, ControlServerBuilder, SinkError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn submit(&self, line: CommandLine) -> Result<(), SinkError> {
        self.lines.lock().push(line.as_str().to_owned());
        Ok(())
    }
}

struct ClosedSink;

#[async_trait]
impl CommandSink for ClosedSink {
    async fn submit(&self, _line: CommandLine) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

struct RawResponse {
    head: String,
    body: String,
}

async fn get(addr: SocketAddr, target: &str) -> Result<RawResponse> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {target} HTTP/1.1\r\nHost: rover\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut raw = String::new();
    // read_to_string only returns once the server closes the connection
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stream.read_to_string(&mut raw),
    )
    .await??;
    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("malformed response: {raw:?}"))?;
    Ok(RawResponse {
        head: head.to_ascii_lowercase(),
        body: body.to_owned(),
    })
}

#[tokio::test]
async fn arm_request_forwards_exact_line() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let server = ControlServerBuilder::new("127.0.0.1:0".parse()?, sink.clone())
        .spawn()
        .await?;

    let response = get(server.local_addr(), "/arm?b=10&h=20&c=30").await?;
    assert!(response.head.starts_with("http/1.1 200 ok"));
    assert!(response.head.contains("content-type: text/plain"));
    assert!(response.head.contains("connection: close"));
    assert_eq!(response.body, "OK");
    assert_eq!(sink.lines(), vec!["ARM:10,20,30".to_owned()]);

    server.shutdown().await
}

#[tokio::test]
async fn invalid_arm_request_forwards_nothing() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let server = ControlServerBuilder::new("127.0.0.1:0".parse()?, sink.clone())
        .spawn()
        .await?;

    for target in ["/arm?b=abc&h=20&c=30", "/arm?b=1&h=2", "/arm?b=inf&h=1&c=1"] {
        let response = get(server.local_addr(), target).await?;
        assert!(response.head.starts_with("http/1.1 200 ok"), "{target}");
        assert_eq!(response.body, "ERR", "{target}");
    }
    assert!(sink.lines().is_empty());

    server.shutdown().await
}

#[tokio::test]
async fn move_tokens_are_forwarded_verbatim() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let server = ControlServerBuilder::new("127.0.0.1:0".parse()?, sink.clone())
        .spawn()
        .await?;

    for target in ["/move?cmd=W", "/move?cmd=Q", "/move"] {
        assert_eq!(get(server.local_addr(), target).await?.body, "OK");
    }
    assert_eq!(sink.lines(), vec!["MOVE:W", "MOVE:Q", "MOVE:"]);

    let response = get(server.local_addr(), "/move?cmd=W%0AARM:0,0,0").await?;
    assert_eq!(response.body, "ERR");
    assert_eq!(sink.lines().len(), 3);

    server.shutdown().await
}

#[tokio::test]
async fn other_paths_serve_the_control_page() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let server = ControlServerBuilder::new("127.0.0.1:0".parse()?, sink.clone())
        .spawn()
        .await?;

    let response = get(server.local_addr(), "/").await?;
    assert!(response.head.starts_with("http/1.1 200 ok"));
    assert!(response.head.contains("content-type: text/html"));
    assert!(response.body.contains("<!DOCTYPE html>"));

    let response = get(server.local_addr(), "/favicon.ico").await?;
    assert!(response.head.starts_with("http/1.1 200 ok"));
    assert!(sink.lines().is_empty());

    server.shutdown().await
}

#[tokio::test]
async fn closed_queue_answers_err() -> Result<()> {
    let server = ControlServerBuilder::new("127.0.0.1:0".parse()?, Arc::new(ClosedSink))
        .spawn()
        .await?;
    assert_eq!(get(server.local_addr(), "/move?cmd=W").await?.body, "ERR");
    server.shutdown().await
}

#[tokio::test]
async fn slow_client_does_not_block_others() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let server = ControlServerBuilder::new("127.0.0.1:0".parse()?, sink.clone())
        .spawn()
        .await?;

    // opens a connection and never finishes its request line
    let mut stalled = TcpStream::connect(server.local_addr()).await?;
    stalled.write_all(b"GET /mo").await?;

    let response = get(server.local_addr(), "/move?cmd=D").await?;
    assert_eq!(response.body, "OK");
    assert_eq!(sink.lines(), vec!["MOVE:D"]);

    drop(stalled);
    server.shutdown().await
}
