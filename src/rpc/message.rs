//! JSON-RPC 2.0 message model.
//!
//! Every wire unit is classified into exactly one [`Message`] shape:
//!
//! | `method` | `id` | shape                         |
//! |----------|------|-------------------------------|
//! | yes      | yes  | [`Message::Request`]          |
//! | yes      | no   | [`Message::Notification`]     |
//! | no       | yes  | [`Message::Response`]         |
//! | no       | no   | rejected as a framing error   |
//!
//! The `jsonrpc` version field is accepted but not required on input, and is
//! always written as `"2.0"` on output.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientError, Result};

/// Protocol version written on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for a method the receiver does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC internal error code; stands in when a peer error carries no
/// integer code.
pub const INTERNAL_ERROR: i64 = -32603;

/// Correlation identifier carried by requests and responses.
///
/// Outbound requests always use [`RequestId::Integer`]; the string form is
/// accepted so server-initiated requests can be answered verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Integer(i64),
    /// String identifier.
    String(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(id) => write!(f, "{id}"),
            Self::String(id) => write!(f, "{id}"),
        }
    }
}

/// JSON-RPC error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Build an error object from whatever the peer put in `error`.
    ///
    /// A missing or non-integer `code` becomes [`INTERNAL_ERROR`]; a missing
    /// or non-string `message` becomes the raw JSON of the error member.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64).unwrap_or(INTERNAL_ERROR);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| value.to_string(), str::to_owned);
        let data = value.get("data").filter(|data| !data.is_null()).cloned();
        Self { code, message, data }
    }
}

impl From<RpcErrorObject> for ClientError {
    fn from(err: RpcErrorObject) -> Self {
        Self::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// A request expecting a response with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    pub params: Option<Value>,
}

/// A response to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the request being answered.
    pub id: RequestId,
    /// `Ok(result)` on success (`null` when the peer omitted it), `Err` when
    /// the peer returned an error object.
    pub outcome: std::result::Result<Value, RpcErrorObject>,
}

/// A fire-and-forget message without an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Optional parameters.
    pub params: Option<Value>,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// One decoded JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Carries both `method` and `id`.
    Request(Request),
    /// Carries `id` and no `method`.
    Response(Response),
    /// Carries `method` and no `id`.
    Notification(Notification),
}

/// Loose inbound envelope; classified by [`Message::parse`].
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Borrowed outbound envelope; field order matches the conventional layout.
#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a RpcErrorObject>,
}

impl Message {
    /// Parse one wire unit (without its trailing newline).
    ///
    /// # Errors
    ///
    /// - [`ClientError::Framing`]`("malformed json: …")` — not a JSON object
    ///   matching the envelope fields.
    /// - [`ClientError::Framing`]`("neither method nor id …")` — valid JSON
    ///   that matches none of the three shapes.
    pub fn parse(line: &str) -> Result<Self> {
        let envelope: InboundEnvelope = serde_json::from_str(line)
            .map_err(|e| ClientError::Framing(format!("malformed json: {e}")))?;

        match (envelope.method, envelope.id) {
            (Some(method), Some(id)) => Ok(Self::Request(Request {
                id,
                method,
                params: envelope.params,
            })),
            (Some(method), None) => Ok(Self::Notification(Notification {
                method,
                params: envelope.params,
            })),
            (None, Some(id)) => {
                let outcome = match envelope.error {
                    None => Ok(envelope.result.unwrap_or(Value::Null)),
                    Some(error) => Err(RpcErrorObject::from_value(error)),
                };
                Ok(Self::Response(Response { id, outcome }))
            }
            (None, None) => Err(ClientError::Framing(
                "neither method nor id present in message".into(),
            )),
        }
    }

    /// Serialize to a compact single-line JSON string (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let envelope = match self {
            Self::Request(req) => OutboundEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id: Some(&req.id),
                method: Some(req.method.as_str()),
                params: req.params.as_ref(),
                result: None,
                error: None,
            },
            Self::Notification(note) => OutboundEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id: None,
                method: Some(note.method.as_str()),
                params: note.params.as_ref(),
                result: None,
                error: None,
            },
            Self::Response(resp) => OutboundEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id: Some(&resp.id),
                method: None,
                params: None,
                result: resp.outcome.as_ref().ok(),
                error: resp.outcome.as_ref().err(),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Method name, if this message carries one.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(note) => Some(&note.method),
            Self::Response(_) => None,
        }
    }
}
