//! Error types shared across the client.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde_json::Value;

/// Shared client result type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error enumeration covering every failure a caller can observe.
///
/// Per-call errors (`Rpc`, `Timeout`, `TurnFailed`) affect one call only.
/// `TransportFailed` is broadcast to every pending call when the peer process
/// dies or its streams break; `TransportClosed` is the orderly counterpart
/// after an explicit shutdown.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Launch or local I/O failure.
    Io(String),
    /// A wire unit could not be decoded; never surfaces as a call failure.
    Framing(String),
    /// A response payload did not match the expected shape.
    Protocol(String),
    /// The peer answered a request with a JSON-RPC error object.
    Rpc {
        /// Numeric JSON-RPC error code.
        code: i64,
        /// Peer-supplied message.
        message: String,
        /// Optional structured detail.
        data: Option<Value>,
    },
    /// A request deadline elapsed before its response arrived.
    Timeout {
        /// Method of the request that timed out.
        method: String,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The peer process exited or a byte stream broke.
    TransportFailed(String),
    /// The transport was shut down by the caller.
    TransportClosed(String),
    /// A turn reached the terminal `failed` status.
    TurnFailed {
        /// Peer-assigned turn identifier.
        turn_id: String,
        /// Peer-supplied failure message.
        message: String,
    },
}

impl ClientError {
    /// Whether this error means the transport is unusable from now on.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TransportFailed(_) | Self::TransportClosed(_))
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Framing(msg) => write!(f, "framing: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Rpc { code, message, .. } => write!(f, "rpc error {code}: {message}"),
            Self::Timeout { method, after } => {
                write!(f, "timeout: {method} got no response within {after:?}")
            }
            Self::TransportFailed(msg) => write!(f, "transport failed: {msg}"),
            Self::TransportClosed(msg) => write!(f, "transport closed: {msg}"),
            Self::TurnFailed { turn_id, message } => write!(f, "turn {turn_id} failed: {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
