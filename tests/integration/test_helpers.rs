//! Shared helpers for transport-level integration tests.
//!
//! Provides an in-memory app server double wired to a [`Transport`] through
//! `tokio::io::duplex` pipes, and a scriptable [`PeerProcess`] so tests can
//! exercise exits and kills without spawning anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::watch;

use agent_conduit::client::AppServerClient;
use agent_conduit::models::handshake::ClientInfo;
use agent_conduit::rpc::{ExitReport, PeerIo, PeerProcess, ProcessFuture, Transport, TransportOptions};

/// Pipe buffer size for the in-memory stdio pair.
const PIPE_BYTES: usize = 256 * 1024;

/// Server end of an in-memory stdio pair.
pub struct FakeServer {
    incoming: Lines<BufReader<DuplexStream>>,
    outgoing: Option<DuplexStream>,
}

impl FakeServer {
    /// Next JSON message written by the client; `None` once the client
    /// closed its stdin.
    pub async fn try_recv(&mut self) -> Option<Value> {
        loop {
            let line = self.incoming.next_line().await.expect("read client line")?;
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).expect("client wrote valid json"));
        }
    }

    /// Next JSON message written by the client.
    pub async fn recv(&mut self) -> Value {
        self.try_recv().await.expect("client closed stdin unexpectedly")
    }

    /// Next message, asserting it is a request for `method`; returns its id
    /// and params.
    pub async fn expect_request(&mut self, method: &str) -> (i64, Value) {
        let msg = self.recv().await;
        assert_eq!(msg["method"], method, "unexpected message: {msg}");
        let id = msg["id"].as_i64().expect("request carries a numeric id");
        (id, msg.get("params").cloned().unwrap_or(Value::Null))
    }

    /// Write one raw line (a `\n` is appended).
    pub async fn send_raw(&mut self, line: &str) {
        let out = self.outgoing.as_mut().expect("server output still open");
        out.write_all(line.as_bytes()).await.expect("write line");
        out.write_all(b"\n").await.expect("write newline");
        out.flush().await.expect("flush");
    }

    /// Write one JSON message.
    pub async fn send(&mut self, message: &Value) {
        self.send_raw(&message.to_string()).await;
    }

    /// Answer request `id` with `result`.
    pub async fn respond(&mut self, id: i64, result: Value) {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    /// Answer request `id` with a JSON-RPC error.
    pub async fn respond_error(&mut self, id: i64, code: i64, message: &str) {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}))
            .await;
    }

    /// Send a notification.
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    /// Accept `initialize` and the following `initialized` notification.
    pub async fn complete_handshake(&mut self) {
        let (id, _) = self.expect_request("initialize").await;
        self.respond(id, json!({"userAgent": "fake-server/1.0"})).await;
        let initialized = self.recv().await;
        assert_eq!(initialized["method"], "initialized");
    }

    /// Close the server's output; the client observes end of stream.
    pub fn close_output(&mut self) {
        self.outgoing = None;
    }
}

/// Build a connected stdio pair: the client half as [`PeerIo`] and the
/// server half as [`FakeServer`].
pub fn stdio_pair() -> (PeerIo, FakeServer) {
    let (client_stdin, server_in) = tokio::io::duplex(PIPE_BYTES);
    let (server_out, client_stdout) = tokio::io::duplex(PIPE_BYTES);
    let server = FakeServer {
        incoming: BufReader::new(server_in).lines(),
        outgoing: Some(server_out),
    };
    (PeerIo::from_streams(client_stdin, client_stdout), server)
}

/// Transport options with short deadlines suited to tests.
pub fn test_options() -> TransportOptions {
    TransportOptions {
        request_timeout: Duration::from_secs(5),
        long_running_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_millis(200),
        ..TransportOptions::default()
    }
}

/// Connect a raw transport to a fake server (no handshake).
pub fn connect_transport() -> (Transport, FakeServer) {
    let (io, server) = stdio_pair();
    (Transport::connect(io, test_options()), server)
}

/// Client identity used by tests.
pub fn test_client_info() -> ClientInfo {
    ClientInfo {
        name: "conduit-tests".into(),
        title: None,
        version: "0.0.0".into(),
    }
}

/// Connect a client to a fake server and complete the handshake.
pub async fn connect_client() -> (AppServerClient, FakeServer) {
    let (io, mut server) = stdio_pair();
    let (client, ()) = tokio::join!(
        AppServerClient::connect(io, test_options(), test_client_info()),
        server.complete_handshake(),
    );
    (client.expect("handshake must succeed"), server)
}

/// Control side of a [`FakeProcess`].
#[derive(Clone)]
pub struct ProcessControl {
    exit: Arc<watch::Sender<Option<ExitReport>>>,
    killed: Arc<AtomicBool>,
}

impl ProcessControl {
    /// Make the process exit with `code`.
    pub fn exit(&self, code: Option<i32>) {
        self.exit.send_replace(Some(ExitReport::from_code(code)));
    }

    /// Whether `kill` was called.
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

/// Scriptable process: runs until told to exit or killed.
pub struct FakeProcess {
    exit_rx: watch::Receiver<Option<ExitReport>>,
    control: ProcessControl,
}

impl FakeProcess {
    /// Create a running process and its control handle.
    pub fn new() -> (Self, ProcessControl) {
        let (tx, rx) = watch::channel(None);
        let control = ProcessControl {
            exit: Arc::new(tx),
            killed: Arc::new(AtomicBool::new(false)),
        };
        (
            Self {
                exit_rx: rx,
                control: control.clone(),
            },
            control,
        )
    }
}

impl PeerProcess for FakeProcess {
    fn wait(&mut self) -> ProcessFuture<'_, ExitReport> {
        Box::pin(async move {
            self.exit_rx
                .wait_for(Option::is_some)
                .await
                .map_err(std::io::Error::other)?;
            let report = self.exit_rx.borrow().clone();
            Ok(report.unwrap_or_else(|| ExitReport::from_code(None)))
        })
    }

    fn kill(&mut self) -> ProcessFuture<'_, ()> {
        Box::pin(async move {
            self.control.killed.store(true, Ordering::SeqCst);
            self.control.exit(None);
            Ok(())
        })
    }
}

/// Connect a raw transport backed by a [`FakeProcess`].
pub fn connect_transport_with_process() -> (Transport, FakeServer, ProcessControl) {
    let (io, server) = stdio_pair();
    let (process, control) = FakeProcess::new();
    let transport = Transport::connect(io.with_process(Box::new(process)), test_options());
    (transport, server, control)
}
