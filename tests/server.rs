//! End-to-end wire scenarios against a real TCP server.

use std::net::SocketAddr;
use std::time::Duration;
use tidekv::storage::StorageError;
use tidekv::{Config, Server, ServerError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let config = Config {
            port: 0,
            reaper_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let server = Server::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
            task,
        }
    }

    async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap();
    }
}

/// Sends `request` and reads exactly `expected.len()` bytes back.
async fn roundtrip(client: &mut TcpStream, request: &[u8], expected: &[u8]) {
    client.write_all(request).await.unwrap();

    let mut buf = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();

    assert_eq!(
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

#[tokio::test]
async fn test_zero_reaper_interval_refused_at_bind() {
    let config = Config {
        port: 0,
        reaper_interval: Duration::ZERO,
        ..Config::default()
    };

    let result = Server::bind(&config).await;
    assert!(matches!(
        result,
        Err(ServerError::Storage(StorageError::InvalidInterval))
    ));
}

#[tokio::test]
async fn test_ping() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_echo() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    roundtrip(
        &mut client,
        b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n",
        b"$3\r\nhey\r\n",
    )
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_set_then_get() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    roundtrip(
        &mut client,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
        b"+OK\r\n",
    )
    .await;
    roundtrip(
        &mut client,
        b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n",
        b"$3\r\nbar\r\n",
    )
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_get_miss() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$4\r\nnope\r\n", b"$-1\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_command_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    roundtrip(
        &mut client,
        b"*1\r\n:5\r\n",
        b"-ERR invalid command format\r\n",
    )
    .await;
    roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_line_breaks_in_command_name_stay_in_one_reply() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    // The next reply must be PONG, not a fragment of the error line
    roundtrip(
        &mut client,
        b"*1\r\n$6\r\nx\r\n+OK\r\n*1\r\n$4\r\nPING\r\n",
        b"-ERR unknown command 'x  +OK'\r\n+PONG\r\n",
    )
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_writes_visible_across_connections() {
    let server = TestServer::start().await;
    let mut writer = server.connect().await;
    let mut reader = server.connect().await;

    roundtrip(
        &mut writer,
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nhello\r\n",
        b"+OK\r\n",
    )
    .await;
    roundtrip(
        &mut reader,
        b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n",
        b"$5\r\nhello\r\n",
    )
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_set_px_expires_over_the_wire() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    roundtrip(
        &mut client,
        b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$2\r\n50\r\n",
        b"+OK\r\n",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", b"$-1\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_protocol_error_drops_connection() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    client.write_all(b"%bogus\r\n").await.unwrap();

    let mut buf = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap_or(0);
    assert_eq!(n, 0);

    // The server itself keeps serving other clients
    let mut other = server.connect().await;
    roundtrip(&mut other, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients_distinct_keys() {
    let server = TestServer::start().await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            let key = format!("key{:02}", i);
            let value = format!("value{:02}", i);
            let set = format!(
                "*3\r\n$3\r\nSET\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
                key.len(),
                key,
                value.len(),
                value
            );
            roundtrip(&mut client, set.as_bytes(), b"+OK\r\n").await;

            let get = format!("*2\r\n$3\r\nGET\r\n${}\r\n{}\r\n", key.len(), key);
            let expected = format!("${}\r\n{}\r\n", value.len(), value);
            roundtrip(&mut client, get.as_bytes(), expected.as_bytes()).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    server.stop().await;
}
