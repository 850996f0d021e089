//! Turn model and the `turn/*` request payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::item::ThreadItem;

/// Lifecycle status of a turn.
///
/// Transitions are driven by the server and only move forward:
/// `inProgress` then one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnStatus {
    /// The turn is still running.
    InProgress,
    /// The turn finished normally.
    Completed,
    /// The turn was interrupted on request.
    Interrupted,
    /// The turn failed; see [`Turn::error`].
    Failed,
    /// A status value this client does not know.
    #[serde(other)]
    Unknown,
}

impl TurnStatus {
    /// Whether no further transition is expected.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }
}

/// Error attached to a failed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnError {
    /// Human-readable failure description.
    pub message: String,
    /// Extra detail supplied by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_details: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One model turn within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Turn identifier.
    pub id: String,
    /// Current status.
    pub status: TurnStatus,
    /// Items in the turn; often empty until completion.
    #[serde(default)]
    pub items: Vec<ThreadItem>,
    /// Failure details when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnError>,
}

impl Turn {
    /// Failure message, falling back to a generic one when the server sent
    /// no error object.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.error
            .as_ref()
            .map_or_else(|| "turn failed without error details".to_owned(), |e| e.message.clone())
    }
}

/// One element of turn input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserInput {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Remote image.
    Image {
        /// Image URL.
        url: String,
    },
    /// Image on the local filesystem.
    LocalImage {
        /// Image path.
        path: String,
    },
}

impl UserInput {
    /// Text input.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Parameters of `turn/start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartParams {
    /// Thread to run the turn in.
    pub thread_id: String,
    /// Turn input.
    pub input: Vec<UserInput>,
    /// Working directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Reasoning effort override (`low`, `medium`, `high`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    /// Approval policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_policy: Option<String>,
    /// Sandbox policy override, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_policy: Option<Value>,
    /// JSON schema the final message must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl TurnStartParams {
    /// Params for a single text prompt.
    pub fn text(thread_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            input: vec![UserInput::text(prompt)],
            ..Self::default()
        }
    }
}

/// Result of `turn/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartResponse {
    /// The new turn, normally `inProgress`.
    pub turn: Turn,
}

/// Parameters of `turn/steer`: extra input for a running turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSteerParams {
    /// Thread of the running turn.
    pub thread_id: String,
    /// Turn expected to be running.
    pub expected_turn_id: String,
    /// Additional input.
    pub input: Vec<UserInput>,
}

/// Result of `turn/steer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSteerResponse {
    /// Turn that received the input.
    pub turn_id: String,
}

/// Parameters of `turn/interrupt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInterruptParams {
    /// Thread of the running turn.
    pub thread_id: String,
    /// Turn to interrupt.
    pub turn_id: String,
}
