//! App server process launcher.
//!
//! Spawns the app server with:
//! - `kill_on_drop(true)` so the process never outlives its handle.
//! - `env_clear()` followed by the configured allowlist and explicit extra
//!   variables, so unrelated secrets in the caller's environment stay out of
//!   the child.
//! - stderr drained by a background task into the `tracing` log.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::LaunchConfig;
use crate::rpc::transport::PeerIo;
use crate::{ClientError, Result};

/// Build the launch command without spawning it.
#[must_use]
pub fn build_command(config: &LaunchConfig) -> Command {
    let mut cmd = Command::new(&config.binary);
    cmd.args(&config.args);

    // Strip inherited environment, then copy only the allowlist.
    cmd.env_clear();
    for key in &config.inherit_env {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    cmd.envs(&config.env);

    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn the app server and capture its stdio.
///
/// No ready signal is awaited: the `initialize` handshake is the first
/// exchange on the link.
///
/// # Errors
///
/// - `ClientError::Io("failed to spawn …")` — OS spawn failure.
/// - `ClientError::Io("failed to capture …")` — a pipe was not created.
pub fn spawn_app_server(config: &LaunchConfig) -> Result<PeerIo> {
    let mut child = build_command(config)
        .spawn()
        .map_err(|err| ClientError::Io(format!("failed to spawn {}: {err}", config.binary)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| ClientError::Io("failed to capture app server stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ClientError::Io("failed to capture app server stdout".into()))?;
    if let Some(stderr) = child.stderr.take() {
        drop(forward_stderr(stderr));
    }

    info!(
        binary = config.binary.as_str(),
        pid = ?child.id(),
        "app server spawned"
    );

    Ok(PeerIo::from_streams(stdin, stdout).with_process(Box::new(child)))
}

/// Forward each stderr line to the log at debug level until EOF.
fn forward_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(target: "agent_conduit::server_stderr", "{line}"),
                Ok(None) => break,
                Err(err) => {
                    debug!(%err, "stderr forwarder: read failed");
                    break;
                }
            }
        }
    })
}
