//! Turn and review aggregation.
//!
//! [`run_turn`] and [`run_review`] turn the fine-grained notification stream
//! of one turn into a single result. Each call:
//!
//! 1. subscribes to the router *before* issuing its start request, so
//!    notifications that race ahead of the start response are buffered;
//! 2. issues `turn/start` / `review/start` and learns the turn id;
//! 3. folds matching notifications into a private [`AggregationState`] until
//!    the terminal `turn/completed` for that turn arrives;
//! 4. drops its subscription on every exit path.
//!
//! Notifications for other turns are skipped, so concurrent aggregations on
//! one client never see each other's data.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::AppServerClient;
use crate::models::item::{ItemDetails, ThreadItem};
use crate::models::notification::{ServerNotification, TurnNotification};
use crate::models::review::ReviewStartParams;
use crate::models::turn::{Turn, TurnStartParams, TurnStatus};
use crate::rpc::router::Subscription;
use crate::{ClientError, Result};

/// Method named in the timeout error when the terminal notification never
/// arrives.
const COMPLETION_METHOD: &str = "turn/completed";

/// Options for [`run_turn`] and [`run_review`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound on the wait for `turn/completed` after the start request
    /// returned; unbounded when `None`.
    pub wait_timeout: Option<Duration>,
}

/// Everything one turn produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    /// Thread the turn ran on.
    pub thread_id: String,
    /// Terminal turn snapshot.
    pub turn: Turn,
    /// Completed items in completion order.
    pub items: Vec<ThreadItem>,
    /// Final agent message text.
    pub agent_message: Option<String>,
    /// Last cumulative diff reported for the turn.
    pub diff: Option<String>,
}

/// Outcome of one review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    /// Thread the review ran on.
    pub thread_id: String,
    /// Terminal turn snapshot.
    pub turn: Turn,
    /// Review-mode items in arrival order.
    pub items: Vec<ThreadItem>,
    /// Review text joined across review-mode items.
    pub review: Option<String>,
}

/// Which `turn/completed` ends the wait.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Turn(String),
    /// No turn id was returned; the first completion on the thread wins.
    Thread(String),
}

impl Target {
    fn matches(&self, notification: &ServerNotification) -> bool {
        match self {
            Self::Turn(turn_id) => notification.turn_id() == Some(turn_id.as_str()),
            Self::Thread(thread_id) => notification.thread_id() == Some(thread_id.as_str()),
        }
    }
}

/// Accumulated payloads of one turn. Owned by a single aggregation call.
#[derive(Debug, Default)]
struct AggregationState {
    items: Vec<ThreadItem>,
    /// Streamed agent text per item id, in first-receipt order.
    texts: Vec<(String, String)>,
    outputs: HashMap<String, String>,
    diff: Option<String>,
}

impl AggregationState {
    fn text_entry(&mut self, item_id: &str) -> &mut String {
        let index = match self.texts.iter().position(|(id, _)| id == item_id) {
            Some(index) => index,
            None => {
                self.texts.push((item_id.to_owned(), String::new()));
                self.texts.len() - 1
            }
        };
        &mut self.texts[index].1
    }

    fn apply(&mut self, notification: ServerNotification) {
        match notification {
            ServerNotification::ItemCompleted(n) => {
                let mut item = n.item;
                match &mut item.details {
                    ItemDetails::AgentMessage(message) => {
                        let text = self.text_entry(&item.id);
                        if text.is_empty() {
                            text.clone_from(&message.text);
                        }
                    }
                    ItemDetails::CommandExecution(command) if command.aggregated_output.is_none() => {
                        command.aggregated_output = self.outputs.get(&item.id).cloned();
                    }
                    _ => {}
                }
                self.items.push(item);
            }
            ServerNotification::AgentMessageDelta(n) => {
                self.text_entry(&n.item_id).push_str(&n.delta);
            }
            ServerNotification::CommandOutputDelta(n) => {
                self.outputs.entry(n.item_id).or_default().push_str(&n.delta);
            }
            ServerNotification::TurnDiffUpdated(n) => self.diff = Some(n.diff),
            _ => {}
        }
    }

    /// Final text of the first agent-message item, falling back to the text
    /// streamed for that item when the completed item carries none. Without
    /// any agent-message item, the streamed text in receipt order.
    fn agent_message(&self) -> Option<String> {
        let text = match self.items.iter().find(|item| item.agent_text().is_some()) {
            Some(item) => match item.agent_text() {
                Some(text) if !text.is_empty() => text.to_owned(),
                _ => self.streamed_text(&item.id).unwrap_or_default(),
            },
            None => self.texts.iter().map(|(_, text)| text.as_str()).collect(),
        };
        (!text.is_empty()).then_some(text)
    }

    fn streamed_text(&self, item_id: &str) -> Option<String> {
        self.texts
            .iter()
            .find(|(id, _)| id == item_id)
            .map(|(_, text)| text.clone())
    }

    /// Use the terminal turn's items when no `item/completed` was observed.
    fn adopt_turn_items(&mut self, turn: &Turn) {
        if self.items.is_empty() && !turn.items.is_empty() {
            debug!(turn_id = turn.id.as_str(), count = turn.items.len(), "aggregator: using items from terminal turn");
            self.items.clone_from(&turn.items);
        }
    }
}

/// Start a turn and wait for it to finish.
///
/// # Errors
///
/// - Any error from `turn/start`.
/// - `ClientError::TurnFailed` when the turn ends with status `failed`.
/// - `ClientError::Timeout` (method `turn/completed`) when
///   [`RunOptions::wait_timeout`] elapses.
/// - The transport's terminal error if the link fails while waiting.
pub async fn run_turn(
    client: &AppServerClient,
    params: &TurnStartParams,
    options: &RunOptions,
) -> Result<TurnResult> {
    let mut subscription = client.subscribe();
    let started = client.turn_start(params).await?;
    let turn_id = started.turn.id;
    info!(turn_id = turn_id.as_str(), thread_id = params.thread_id.as_str(), "aggregator: turn started");

    let mut state = AggregationState::default();
    let completed = wait_for_completion(
        client,
        &mut subscription,
        &Target::Turn(turn_id),
        &mut state,
        options,
    )
    .await?;
    drop(subscription);

    let turn = completed.turn;
    ensure_not_failed(&turn)?;
    state.adopt_turn_items(&turn);

    let agent_message = state.agent_message();
    info!(
        turn_id = turn.id.as_str(),
        status = ?turn.status,
        items = state.items.len(),
        "aggregator: turn finished"
    );
    Ok(TurnResult {
        thread_id: completed.thread_id,
        turn,
        items: state.items,
        agent_message,
        diff: state.diff,
    })
}

/// Start a review and wait for it to finish.
///
/// When the start response carries no turn id, the first `turn/completed`
/// on the review thread (or the requesting thread) ends the wait; two
/// concurrent reviews on one thread cannot be told apart in that case.
///
/// # Errors
///
/// Same as [`run_turn`], with `review/start` as the start request.
pub async fn run_review(
    client: &AppServerClient,
    params: &ReviewStartParams,
    options: &RunOptions,
) -> Result<ReviewResult> {
    let mut subscription = client.subscribe();
    let started = client.review_start(params).await?;
    let thread_id = started
        .review_thread_id
        .clone()
        .unwrap_or_else(|| params.thread_id.clone());
    let target = match started.turn {
        Some(turn) => Target::Turn(turn.id),
        None => {
            warn!(thread_id = thread_id.as_str(), "aggregator: review started without turn id, matching by thread");
            Target::Thread(thread_id.clone())
        }
    };
    info!(thread_id = thread_id.as_str(), ?target, "aggregator: review started");

    let mut state = AggregationState::default();
    let completed =
        wait_for_completion(client, &mut subscription, &target, &mut state, options).await?;
    drop(subscription);

    let turn = completed.turn;
    ensure_not_failed(&turn)?;
    state.adopt_turn_items(&turn);

    let items: Vec<ThreadItem> = state
        .items
        .into_iter()
        .filter(|item| item.review_text().is_some())
        .collect();
    let review = join_review_text(&items);
    info!(turn_id = turn.id.as_str(), items = items.len(), "aggregator: review finished");
    Ok(ReviewResult {
        thread_id: completed.thread_id,
        turn,
        items,
        review,
    })
}

/// Join the non-empty review texts of `items` with newlines, trimmed.
#[must_use]
pub fn join_review_text(items: &[ThreadItem]) -> Option<String> {
    let joined = items
        .iter()
        .filter_map(ThreadItem::review_text)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn ensure_not_failed(turn: &Turn) -> Result<()> {
    if turn.status == TurnStatus::Failed {
        let message = turn.failure_message();
        warn!(turn_id = turn.id.as_str(), message = message.as_str(), "aggregator: turn failed");
        return Err(ClientError::TurnFailed {
            turn_id: turn.id.clone(),
            message,
        });
    }
    Ok(())
}

async fn wait_for_completion(
    client: &AppServerClient,
    subscription: &mut Subscription,
    target: &Target,
    state: &mut AggregationState,
    options: &RunOptions,
) -> Result<TurnNotification> {
    let consume = consume_until_completed(client, subscription, target, state);
    match options.wait_timeout {
        None => consume.await,
        Some(limit) => tokio::time::timeout(limit, consume)
            .await
            .unwrap_or_else(|_| {
                warn!(?target, ?limit, "aggregator: gave up waiting for completion");
                Err(ClientError::Timeout {
                    method: COMPLETION_METHOD.to_owned(),
                    after: limit,
                })
            }),
    }
}

async fn consume_until_completed(
    client: &AppServerClient,
    subscription: &mut Subscription,
    target: &Target,
    state: &mut AggregationState,
) -> Result<TurnNotification> {
    while let Some(raw) = subscription.recv().await {
        let Some(notification) = ServerNotification::parse(&raw) else {
            continue;
        };
        if !target.matches(&notification) {
            continue;
        }
        if let ServerNotification::TurnCompleted(completed) = notification {
            return Ok(completed);
        }
        debug!(method = raw.method.as_str(), "aggregator: applying notification");
        state.apply(notification);
    }

    Err(client
        .transport()
        .terminal_error()
        .unwrap_or_else(|| ClientError::TransportClosed("notification stream ended".into())))
}
