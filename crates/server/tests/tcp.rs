mod common;

use anyhow::{Context, Result};
use common::{execute_code, request, spawn_server, tool_text, unstarted_server};
use hostbridge_server::{Protocol, Transport};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::{Duration, timeout},
};

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Result<Self> {
        let (reader, writer) = TcpStream::connect(addr).await?.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    async fn send_raw(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(format!("{line}\n").as_bytes()).await?;
        Ok(())
    }

    async fn call(&mut self, message: &Value) -> Result<Value> {
        self.send_raw(&message.to_string()).await?;
        let line = timeout(Duration::from_secs(10), self.lines.next_line())
            .await??
            .context("connection closed")?;
        Ok(serde_json::from_str(&line)?)
    }
}

#[tokio::test]
async fn persistent_connection_round_trip() -> Result<()> {
    let (server, addr) = spawn_server(Transport::Tcp, Protocol::Mcp).await?;
    let mut client = Client::connect(addr).await?;

    let reply = client.call(&request(1, "initialize", json!({}))).await?;
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");

    let reply = client.call(&request(2, "tools/list", json!({}))).await?;
    assert_eq!(reply["result"]["tools"][0]["name"], "execute_code");

    let reply = client.call(&execute_code(3, "result = 5 + 3")).await?;
    assert_eq!(reply["id"], 3);
    assert!(tool_text(&reply).contains('8'));

    let reply = client.call(&execute_code(4, "error('test error')")).await?;
    assert_eq!(reply["result"]["isError"], true);

    let reply = client.call(&execute_code(5, "print('hello world')")).await?;
    assert!(tool_text(&reply).contains("hello world"));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn lines_are_trimmed_and_notifications_are_silent() -> Result<()> {
    let (server, addr) = spawn_server(Transport::Tcp, Protocol::Mcp).await?;
    let mut client = Client::connect(addr).await?;

    // nothing may come back for this one, so the next reply must be id 2
    client
        .send_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await?;
    client
        .send_raw(&format!("   {}\t\r", request(2, "tools/list", json!({}))))
        .await?;
    let line = timeout(Duration::from_secs(10), client.lines.next_line())
        .await??
        .context("connection closed")?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["id"], 2);

    let reply = client.call(&json!("not an object")).await?;
    assert_eq!(reply["error"]["code"], -32600);

    client.send_raw("{garbage").await?;
    let line = client.lines.next_line().await?.context("connection closed")?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["error"]["code"], -32700);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_closes_open_connections() -> Result<()> {
    let (server, addr) = spawn_server(Transport::Tcp, Protocol::Rpc).await?;
    let mut client = Client::connect(addr).await?;
    let reply = client
        .call(&request(1, "execute", json!({"code": "result = 'up'"})))
        .await?;
    assert_eq!(reply["result"], "up");

    server.stop().await;
    let eof = timeout(Duration::from_secs(10), client.lines.next_line()).await?;
    assert!(matches!(eof, Ok(None) | Err(_)));
    assert!(TcpStream::connect(addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn stop_before_start_is_a_no_op() -> Result<()> {
    let server = unstarted_server(Transport::Tcp, Protocol::Mcp);
    server.stop().await;
    server.stop().await;
    assert!(!server.is_running());
    assert_eq!(server.local_addr(), None);

    // still startable afterwards
    let addr = server.start().await?;
    assert_eq!(server.local_addr(), Some(addr));
    server.stop().await;
    assert!(!server.is_running());
    Ok(())
}
