//! JSON-RPC transport over a pair of byte streams.
//!
//! A [`Transport`] owns three background tasks:
//!
//! - the **reader** (`run_reader`): sole producer of response resolutions
//!   and notification dispatches.
//! - the **writer** (`run_writer`): sole owner of the peer's stdin.
//! - the **exit monitor** (`monitor_exit`): sole owner of the peer process
//!   handle, when there is one.
//!
//! Callers only register pending entries and await them. All mutable shared
//! state (pending registry, subscription registry, link state) lives in
//! `Shared`, created when the transport connects and torn down when it
//! fails or shuts down; nothing is process-global.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rpc::codec::DEFAULT_MAX_LINE_BYTES;
use crate::rpc::lifecycle::{monitor_exit, ExitReport, PeerProcess, TransportEvent};
use crate::rpc::message::{Message, Notification, Request, RequestId};
use crate::rpc::pending::PendingRequests;
use crate::rpc::reader::run_reader;
use crate::rpc::router::{NotificationRouter, Subscription};
use crate::rpc::writer::run_writer;
use crate::{ClientError, Result};

/// Methods that use the long-running deadline by default.
pub const LONG_RUNNING_METHODS: &[&str] = &["turn/start", "turn/steer", "review/start", "command/exec"];

/// Capacity of the lifecycle event broadcast channel.
const EVENT_BUFFER: usize = 64;

/// Byte streams and process handle of a connected peer.
pub struct PeerIo {
    /// Writable end connected to the peer's stdin.
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// Readable end connected to the peer's stdout.
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Termination handle; `None` when the streams are not backed by a
    /// process (in-memory pipes, sockets handed over by a supervisor).
    pub process: Option<Box<dyn PeerProcess>>,
}

impl PeerIo {
    /// Bundle streams without a process handle.
    pub fn from_streams<W, R>(stdin: W, stdout: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            process: None,
        }
    }

    /// Attach a process handle.
    #[must_use]
    pub fn with_process(mut self, process: Box<dyn PeerProcess>) -> Self {
        self.process = Some(process);
        self
    }
}

impl std::fmt::Debug for PeerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerIo")
            .field("has_process", &self.process.is_some())
            .finish_non_exhaustive()
    }
}

/// Tunables for one transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Deadline for ordinary requests.
    pub request_timeout: Duration,
    /// Deadline for [`LONG_RUNNING_METHODS`].
    pub long_running_timeout: Duration,
    /// How long shutdown waits for the peer to exit before killing it.
    pub shutdown_grace: Duration,
    /// Maximum accepted inbound line length.
    pub max_line_bytes: usize,
    /// Capacity of the outbound message queue.
    pub outbound_capacity: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            long_running_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            outbound_capacity: 64,
        }
    }
}

impl TransportOptions {
    /// Default deadline for `method`.
    #[must_use]
    pub fn timeout_for(&self, method: &str) -> Duration {
        if LONG_RUNNING_METHODS.contains(&method) {
            self.long_running_timeout
        } else {
            self.request_timeout
        }
    }
}

/// Link state; only `Open` accepts new work.
#[derive(Debug, Clone, PartialEq)]
enum LinkState {
    Open,
    Closing,
    Failed(ClientError),
    Closed,
}

/// State shared between the transport handle and its background tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pending: PendingRequests,
    router: NotificationRouter,
    events: broadcast::Sender<TransportEvent>,
    state: Mutex<LinkState>,
}

impl Shared {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            pending: PendingRequests::new(),
            router: NotificationRouter::new(),
            events,
            state: Mutex::new(LinkState::Open),
        }
    }

    pub(crate) fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub(crate) fn router(&self) -> &NotificationRouter {
        &self.router
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Error to hand a caller when the link no longer accepts work.
    fn unavailable(&self) -> Option<ClientError> {
        match &*self.lock_state() {
            LinkState::Open => None,
            LinkState::Failed(err) => Some(err.clone()),
            LinkState::Closing | LinkState::Closed => {
                Some(ClientError::TransportClosed("transport shut down".into()))
            }
        }
    }

    /// Fail the link: reject everything pending, end every subscription and
    /// publish [`TransportEvent::Failed`].
    ///
    /// No-op unless the link is open; failures observed during an explicit
    /// shutdown are expected.
    pub(crate) fn stream_failed(&self, reason: &str) {
        let error = ClientError::TransportFailed(reason.to_owned());
        {
            let mut state = self.lock_state();
            if *state != LinkState::Open {
                debug!(reason, "transport: stream ended while not open");
                return;
            }
            *state = LinkState::Failed(error.clone());
        }
        let rejected = self.pending.fail_all(&error);
        self.router.close();
        warn!(reason, rejected, "transport: failed");
        let _ = self.events.send(TransportEvent::Failed(error));
    }

    pub(crate) fn framing_error(&self, error: &ClientError) {
        let _ = self.events.send(TransportEvent::FramingError(error.to_string()));
    }

    /// Publish [`TransportEvent::Exited`] and fail the link, unless a
    /// shutdown already owns the link; that exit is expected and only logged.
    pub(crate) fn process_exited(&self, report: &ExitReport) {
        if *self.lock_state() != LinkState::Open {
            debug!(code = ?report.code, reason = report.reason.as_str(), "transport: peer exited during shutdown");
            return;
        }
        let _ = self.events.send(TransportEvent::Exited(report.clone()));
        self.stream_failed(&report.reason);
    }

    /// Move an open link to `Closing`; returns whether it was open.
    fn begin_closing(&self) -> bool {
        let mut state = self.lock_state();
        if *state == LinkState::Open {
            *state = LinkState::Closing;
            true
        } else {
            false
        }
    }

    fn finish_closing(&self) {
        {
            let mut state = self.lock_state();
            if *state == LinkState::Closing {
                *state = LinkState::Closed;
            }
        }
        let error = ClientError::TransportClosed("transport shut down".into());
        let rejected = self.pending.fail_all(&error);
        if rejected > 0 {
            warn!(rejected, "transport: requests still pending at shutdown were rejected");
        }
        self.router.close();
        let _ = self.events.send(TransportEvent::Closed);
    }
}

/// Background tasks owned by one transport.
#[derive(Debug)]
struct Tasks {
    writer: JoinHandle<Result<()>>,
    reader: JoinHandle<()>,
    monitor: Option<JoinHandle<Option<ExitReport>>>,
}

/// Removes a pending entry if the awaiting call is dropped early.
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

/// Handle to a connected JSON-RPC peer.
#[derive(Debug)]
pub struct Transport {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Message>,
    options: TransportOptions,
    writer_cancel: CancellationToken,
    reader_cancel: CancellationToken,
    process_shutdown: CancellationToken,
    tasks: tokio::sync::Mutex<Option<Tasks>>,
}

impl Transport {
    /// Start the reader, writer and exit-monitor tasks over `io`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(io: PeerIo, options: TransportOptions) -> Self {
        let shared = Arc::new(Shared::new());
        let (outbound, msg_rx) = mpsc::channel(options.outbound_capacity.max(1));
        let writer_cancel = CancellationToken::new();
        let reader_cancel = CancellationToken::new();
        let process_shutdown = CancellationToken::new();

        let writer = tokio::spawn(run_writer(
            io.stdin,
            msg_rx,
            Arc::clone(&shared),
            writer_cancel.clone(),
        ));
        let reader = tokio::spawn(run_reader(
            io.stdout,
            options.max_line_bytes,
            Arc::clone(&shared),
            outbound.clone(),
            reader_cancel.clone(),
        ));
        let monitor = io.process.map(|process| {
            monitor_exit(
                process,
                Arc::clone(&shared),
                process_shutdown.clone(),
                options.shutdown_grace,
            )
        });

        info!(has_process = monitor.is_some(), "transport: connected");

        Self {
            shared,
            outbound,
            options,
            writer_cancel,
            reader_cancel,
            process_shutdown,
            tasks: tokio::sync::Mutex::new(Some(Tasks {
                writer,
                reader,
                monitor,
            })),
        }
    }

    /// Options this transport was created with.
    #[must_use]
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Send a request and wait for its response.
    ///
    /// `timeout` overrides the default deadline from
    /// [`TransportOptions::timeout_for`].
    ///
    /// # Errors
    ///
    /// - [`ClientError::Rpc`] — the peer answered with an error object.
    /// - [`ClientError::Timeout`] — no response within the deadline; the
    ///   entry is removed and a late response is ignored.
    /// - [`ClientError::TransportFailed`] / [`ClientError::TransportClosed`] —
    ///   the link failed or was shut down before a response arrived, or was
    ///   already unusable when the call was made.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if let Some(err) = self.shared.unavailable() {
            return Err(err);
        }
        let deadline = timeout.unwrap_or_else(|| self.options.timeout_for(method));

        let (id, mut completion) = self.shared.pending.register(method);
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            id,
        };

        // The link may have failed between the check above and registration,
        // after `fail_all` already drained the registry.
        if let Some(err) = self.shared.unavailable() {
            return Err(err);
        }

        debug!(id, method, ?deadline, "transport: sending request");
        let message = Message::Request(Request {
            id: RequestId::Integer(id),
            method: method.to_owned(),
            params,
        });
        if self.outbound.send(message).await.is_err() {
            return Err(self.closed_error());
        }

        match tokio::time::timeout(deadline, &mut completion).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => {
                if self.shared.pending.remove(id) {
                    warn!(id, method, ?deadline, "transport: request timed out");
                    Err(ClientError::Timeout {
                        method: method.to_owned(),
                        after: deadline,
                    })
                } else {
                    completion.try_recv().unwrap_or_else(|_| {
                        Err(ClientError::Timeout {
                            method: method.to_owned(),
                            after: deadline,
                        })
                    })
                }
            }
        }
    }

    /// Send a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the link is no longer open.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if let Some(err) = self.shared.unavailable() {
            return Err(err);
        }
        debug!(method, "transport: sending notification");
        self.outbound
            .send(Message::Notification(Notification::new(method, params)))
            .await
            .map_err(|_| self.closed_error())
    }

    /// Subscribe to inbound notifications.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.router.subscribe()
    }

    /// Subscribe to lifecycle events (framing errors, failure, exit, close).
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the link still accepts new requests.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.unavailable().is_none()
    }

    /// Error describing why the link stopped accepting work; `None` while
    /// open.
    #[must_use]
    pub fn terminal_error(&self) -> Option<ClientError> {
        self.shared.unavailable()
    }

    /// Shut the transport down in order.
    ///
    /// 1. Close the outbound sink (the writer task ends and closes stdin).
    /// 2. Await process termination, killing the peer after the grace
    ///    period; an expected exit raises no error.
    /// 3. Drain and stop the read loop.
    /// 4. Reject anything still pending with [`ClientError::TransportClosed`].
    ///
    /// Idempotent: later calls return `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for flush failures.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(mut tasks) = self.tasks.lock().await.take() else {
            debug!("transport: shutdown already performed");
            return Ok(());
        };

        let was_open = self.shared.begin_closing();
        info!(was_open, "transport: shutting down");

        self.writer_cancel.cancel();
        match (&mut tasks.writer).await {
            Ok(Err(e)) => debug!(error = %e, "transport: writer ended with error"),
            Err(e) => warn!(error = %e, "transport: writer task panicked"),
            Ok(Ok(())) => {}
        }

        self.process_shutdown.cancel();
        if let Some(monitor) = tasks.monitor.take() {
            match monitor.await {
                Ok(Some(report)) => info!(code = ?report.code, reason = report.reason.as_str(), "transport: peer exited"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "transport: exit monitor panicked"),
            }
        }

        let grace = self.options.shutdown_grace;
        if tokio::time::timeout(grace, &mut tasks.reader).await.is_err() {
            debug!(?grace, "transport: reader still running, cancelling");
            self.reader_cancel.cancel();
            let _ = tasks.reader.await;
        }

        self.shared.finish_closing();
        info!("transport: shut down");
        Ok(())
    }

    fn closed_error(&self) -> ClientError {
        self.shared
            .unavailable()
            .unwrap_or_else(|| ClientError::TransportClosed("outbound queue closed".into()))
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.writer_cancel.cancel();
        self.reader_cancel.cancel();
        self.process_shutdown.cancel();
    }
}
