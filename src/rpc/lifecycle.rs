//! Peer process lifecycle.
//!
//! The transport only needs two things from the peer process: a way to wait
//! for it to exit and a way to kill it. [`PeerProcess`] captures exactly that
//! so tests can substitute a scripted fake for a real
//! [`tokio::process::Child`].
//!
//! [`monitor_exit`] owns the process handle for the lifetime of the
//! transport. An exit observed while the link is open is a transport failure;
//! an exit observed after [`Transport::shutdown`](crate::rpc::transport::Transport::shutdown)
//! began is expected and only logged.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::rpc::transport::Shared;
use crate::ClientError;

/// Boxed future returned by [`PeerProcess`] methods.
pub type ProcessFuture<'a, T> = Pin<Box<dyn Future<Output = std::io::Result<T>> + Send + 'a>>;

/// How the peer process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Human-readable description.
    pub reason: String,
}

impl ExitReport {
    /// Build a report from an exit code (`None` meaning killed by a signal).
    #[must_use]
    pub fn from_code(code: Option<i32>) -> Self {
        let reason = code.map_or_else(
            || "process terminated by signal".to_owned(),
            |c| format!("process exited with code {c}"),
        );
        Self { code, reason }
    }
}

/// Termination handle for the peer process.
pub trait PeerProcess: Send {
    /// Wait for the process to exit.
    fn wait(&mut self) -> ProcessFuture<'_, ExitReport>;

    /// Forcefully terminate the process.
    fn kill(&mut self) -> ProcessFuture<'_, ()>;
}

impl PeerProcess for tokio::process::Child {
    fn wait(&mut self) -> ProcessFuture<'_, ExitReport> {
        Box::pin(async move {
            let status = tokio::process::Child::wait(self).await?;
            Ok(ExitReport::from_code(status.code()))
        })
    }

    fn kill(&mut self) -> ProcessFuture<'_, ()> {
        Box::pin(tokio::process::Child::kill(self))
    }
}

/// Lifecycle signals published to external observers.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A wire unit could not be decoded; the stream continues.
    FramingError(String),
    /// The transport failed; every pending request has been rejected.
    Failed(ClientError),
    /// The peer process exited.
    Exited(ExitReport),
    /// An explicit shutdown completed.
    Closed,
}

/// Spawn the task that owns `process` and watches for its exit.
///
/// - Exit while the link is open: fails the transport with
///   [`ClientError::TransportFailed`].
/// - `shutdown` fires: waits up to `grace` for the process to exit on its
///   own (stdin is already closed by then), kills it otherwise.
///
/// The task resolves to the exit report, if one was obtained.
#[must_use]
pub(crate) fn monitor_exit(
    mut process: Box<dyn PeerProcess>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    grace: Duration,
) -> JoinHandle<Option<ExitReport>> {
    tokio::spawn(async move {
        let observed = tokio::select! {
            result = process.wait() => Some(result),
            () = shutdown.cancelled() => None,
        };

        let report = match observed {
            Some(result) => {
                let report = result.unwrap_or_else(|err| {
                    warn!(%err, "lifecycle: error waiting for peer process");
                    ExitReport {
                        code: None,
                        reason: format!("wait error: {err}"),
                    }
                });
                shared.process_exited(&report);
                report
            }
            None => wait_or_kill(process.as_mut(), grace).await,
        };

        Some(report)
    })
}

async fn wait_or_kill(process: &mut dyn PeerProcess, grace: Duration) -> ExitReport {
    if let Ok(result) = tokio::time::timeout(grace, process.wait()).await {
        return match result {
            Ok(report) => {
                info!(code = ?report.code, "lifecycle: peer process exited after shutdown");
                report
            }
            Err(err) => ExitReport {
                code: None,
                reason: format!("wait error: {err}"),
            },
        };
    }

    warn!(?grace, "lifecycle: peer process did not exit in time, killing");
    if let Err(err) = process.kill().await {
        warn!(%err, "lifecycle: kill failed");
    }
    match process.wait().await {
        Ok(report) => report,
        Err(err) => ExitReport {
            code: None,
            reason: format!("killed; wait error: {err}"),
        },
    }
}
