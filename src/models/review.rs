//! `review/start` payloads.

use serde::{Deserialize, Serialize};

use crate::models::turn::Turn;

/// What the review looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReviewTarget {
    /// Staged, unstaged and untracked changes in the working tree.
    UncommittedChanges,
    /// Changes relative to a base branch.
    #[serde(rename_all = "camelCase")]
    BaseBranch {
        /// Branch to diff against.
        branch: String,
    },
    /// A single commit.
    #[serde(rename_all = "camelCase")]
    Commit {
        /// Commit hash.
        sha: String,
        /// Optional commit title for display.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Free-form review instructions.
    #[serde(rename_all = "camelCase")]
    Custom {
        /// Instructions for the reviewer.
        instructions: String,
    },
}

/// Where the review runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewDelivery {
    /// On the current thread.
    Inline,
    /// On a new thread forked for the review.
    Detached,
}

/// Parameters of `review/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStartParams {
    /// Thread that requests the review.
    pub thread_id: String,
    /// Review target.
    pub target: ReviewTarget,
    /// Delivery mode; server default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<ReviewDelivery>,
}

/// Result of `review/start`.
///
/// Both fields are optional: older servers return neither and the review is
/// then tracked by the requesting thread id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStartResponse {
    /// The review turn.
    #[serde(default)]
    pub turn: Option<Turn>,
    /// Thread the review runs on, when it differs from the requester.
    #[serde(default)]
    pub review_thread_id: Option<String>,
}
