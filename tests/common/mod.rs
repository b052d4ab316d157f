//! Helpers shared by the integration tests: an in-process server on an
//! ephemeral port and a small line-oriented client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use session_relay::config::ServerConfig;
use session_relay::logger::LogPipeline;
use session_relay::server::registry::ClientRegistry;
use session_relay::server::{Server, ShutdownHandle};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time;

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ClientRegistry>,
    pub pipeline: Arc<LogPipeline>,
    pub shutdown: ShutdownHandle,
    pub log_path: PathBuf,
    task: JoinHandle<()>,
    _dir: TempDir,
}

pub fn test_config(capacity: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        capacity,
        shutdown_grace_ms: 1000,
        ..ServerConfig::default()
    }
}

pub async fn spawn_server(config: ServerConfig) -> TestServer {
    let dir = tempfile::tempdir().expect("temp dir");
    let log_path = dir.path().join("server.log");
    let pipeline = Arc::new(LogPipeline::open(&log_path).expect("open log"));

    let server = Server::start(config, pipeline.clone())
        .await
        .expect("server start");
    let addr = server.local_addr();
    let registry = server.registry();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());

    TestServer {
        addr,
        registry,
        pipeline,
        shutdown,
        log_path,
        task,
        _dir: dir,
    }
}

impl TestServer {
    /// Flushes the pipeline and returns the log file contents.
    pub fn log_contents(&self) -> String {
        self.pipeline.flush();
        std::fs::read_to_string(&self.log_path).expect("read log")
    }

    /// Shuts the server down and waits for the accept loop to finish.
    pub async fn stop(self) -> String {
        self.shutdown.shutdown();
        assert!(self.shutdown.is_shutdown());
        time::timeout(IO_TIMEOUT, self.task)
            .await
            .expect("server stopped in time")
            .expect("server task");
        self.pipeline.flush();
        std::fs::read_to_string(&self.log_path).expect("read log")
    }

    /// Polls the log file until it mentions `needle`, returning the contents.
    pub async fn wait_for_log(&self, needle: &str) -> String {
        let path = self.log_path.clone();
        let mut contents = String::new();
        wait_until(|| {
            contents = std::fs::read_to_string(&path).unwrap_or_default();
            contents.contains(needle)
        })
        .await;
        contents
    }

    pub async fn wait_for_sessions(&self, expected: usize) {
        let registry = self.registry.clone();
        wait_until(move || registry.len() == expected).await;
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    time::timeout(IO_TIMEOUT, async {
        while !condition() {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    pub local_addr: SocketAddr,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let local_addr = stream.local_addr().expect("local addr");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            local_addr,
        }
    }

    /// Connects, sends `name` and returns the client with the welcome line.
    pub async fn join(addr: SocketAddr, name: &str) -> (Self, String) {
        let mut client = Self::connect(addr).await;
        client.send(name).await;
        let welcome = client.recv().await.expect("welcome line");
        (client, welcome)
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("send");
    }

    /// Next line from the server, `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        time::timeout(IO_TIMEOUT, self.lines.next_line())
            .await
            .expect("server replied in time")
            .unwrap_or(None)
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await.expect("reply line")
    }

    /// Writes `line` over and over for `duration` without reading any replies.
    pub async fn flood(&mut self, line: &str, duration: Duration) {
        let bytes = format!("{}\n", line).into_bytes();
        let writer = &mut self.writer;
        let _ = time::timeout(duration, async move {
            while writer.write_all(&bytes).await.is_ok() {}
        })
        .await;
    }

    /// Closes the connection with a TCP reset instead of a clean FIN.
    #[allow(deprecated)]
    pub fn reset(self) {
        let reader = self.lines.into_inner().into_inner();
        let stream = reader.reunite(self.writer).expect("halves of one stream");
        stream.set_linger(Some(Duration::ZERO)).expect("set linger");
        drop(stream);
    }
}
