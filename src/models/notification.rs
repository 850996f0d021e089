//! Typed server notifications.
//!
//! [`ServerNotification::parse`] validates a raw [`Notification`] against the
//! payload shape of its method. A payload that fails validation is dropped
//! (logged at debug) rather than surfaced half-parsed; methods this client
//! does not model pass through as [`ServerNotification::Other`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::item::ThreadItem;
use crate::models::thread::Thread;
use crate::models::turn::Turn;
use crate::rpc::message::Notification;

/// `thread/started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStartedNotification {
    /// The new thread.
    pub thread: Thread,
}

/// `turn/started` and `turn/completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnNotification {
    /// Owning thread.
    pub thread_id: String,
    /// Turn snapshot.
    pub turn: Turn,
}

/// `item/started` and `item/completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemNotification {
    /// Owning thread.
    pub thread_id: String,
    /// Owning turn.
    pub turn_id: String,
    /// Item snapshot.
    pub item: ThreadItem,
}

/// `item/agentMessage/delta` and `item/commandExecution/outputDelta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaNotification {
    /// Owning thread.
    pub thread_id: String,
    /// Owning turn.
    pub turn_id: String,
    /// Item the text belongs to.
    pub item_id: String,
    /// Text fragment.
    pub delta: String,
}

/// `turn/diff/updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnDiffNotification {
    /// Owning thread.
    pub thread_id: String,
    /// Owning turn.
    pub turn_id: String,
    /// Cumulative unified diff for the turn so far.
    pub diff: String,
}

/// One step of an agent plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Step description.
    pub step: String,
    /// `pending`, `inProgress` or `completed`.
    pub status: String,
}

/// `turn/plan/updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPlanNotification {
    /// Owning thread.
    #[serde(default)]
    pub thread_id: String,
    /// Owning turn.
    pub turn_id: String,
    /// Optional explanation of the change.
    #[serde(default)]
    pub explanation: Option<String>,
    /// Full plan after the update.
    #[serde(default)]
    pub plan: Vec<PlanStep>,
}

/// A notification classified by method with a validated payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    /// `thread/started`
    ThreadStarted(ThreadStartedNotification),
    /// `turn/started`
    TurnStarted(TurnNotification),
    /// `turn/completed`
    TurnCompleted(TurnNotification),
    /// `item/started`
    ItemStarted(ItemNotification),
    /// `item/completed`
    ItemCompleted(ItemNotification),
    /// `item/agentMessage/delta`
    AgentMessageDelta(DeltaNotification),
    /// `item/commandExecution/outputDelta`
    CommandOutputDelta(DeltaNotification),
    /// `turn/diff/updated`
    TurnDiffUpdated(TurnDiffNotification),
    /// `turn/plan/updated`
    TurnPlanUpdated(TurnPlanNotification),
    /// Any other method, unchanged.
    Other(Notification),
}

impl ServerNotification {
    /// Classify `notification`; `None` when a known method carries an
    /// invalid payload.
    #[must_use]
    pub fn parse(notification: &Notification) -> Option<Self> {
        let method = notification.method.as_str();
        let parsed = match method {
            "thread/started" => decode(notification).map(Self::ThreadStarted),
            "turn/started" => decode(notification).map(Self::TurnStarted),
            "turn/completed" => decode(notification).map(Self::TurnCompleted),
            "item/started" => decode(notification).map(Self::ItemStarted),
            "item/completed" => decode(notification).map(Self::ItemCompleted),
            "item/agentMessage/delta" => decode(notification).map(Self::AgentMessageDelta),
            "item/commandExecution/outputDelta" => {
                decode(notification).map(Self::CommandOutputDelta)
            }
            "turn/diff/updated" => decode(notification).map(Self::TurnDiffUpdated),
            "turn/plan/updated" => decode(notification).map(Self::TurnPlanUpdated),
            _ => Ok(Self::Other(notification.clone())),
        };

        match parsed {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(method, %err, "notification: invalid payload dropped");
                None
            }
        }
    }

    /// Thread the notification belongs to, when it names one.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted(n) => Some(&n.thread.id),
            Self::TurnStarted(n) | Self::TurnCompleted(n) => Some(&n.thread_id),
            Self::ItemStarted(n) | Self::ItemCompleted(n) => Some(&n.thread_id),
            Self::AgentMessageDelta(n) | Self::CommandOutputDelta(n) => Some(&n.thread_id),
            Self::TurnDiffUpdated(n) => Some(&n.thread_id),
            Self::TurnPlanUpdated(n) => Some(&n.thread_id),
            Self::Other(_) => None,
        }
    }

    /// Turn the notification belongs to, when it names one.
    #[must_use]
    pub fn turn_id(&self) -> Option<&str> {
        match self {
            Self::TurnStarted(n) | Self::TurnCompleted(n) => Some(&n.turn.id),
            Self::ItemStarted(n) | Self::ItemCompleted(n) => Some(&n.turn_id),
            Self::AgentMessageDelta(n) | Self::CommandOutputDelta(n) => Some(&n.turn_id),
            Self::TurnDiffUpdated(n) => Some(&n.turn_id),
            Self::TurnPlanUpdated(n) => Some(&n.turn_id),
            Self::ThreadStarted(_) | Self::Other(_) => None,
        }
    }
}

fn decode<T: DeserializeOwned>(notification: &Notification) -> serde_json::Result<T> {
    let params = notification.params.clone().unwrap_or(Value::Null);
    serde_json::from_value(params)
}
