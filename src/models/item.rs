//! Thread item model.
//!
//! Items are tagged on the wire by a camelCase `type` field. Kinds this crate
//! does not know survive as [`ItemDetails::Unknown`] with their raw fields, so
//! a newer server never breaks parsing of a turn.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One unit of work produced inside a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadItem {
    /// Item identifier, unique within its turn.
    pub id: String,
    /// Kind-specific payload.
    pub details: ItemDetails,
}

/// Kind-specific item payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDetails {
    /// Input supplied by the user.
    UserMessage(UserMessageItem),
    /// Text produced by the agent.
    AgentMessage(AgentMessageItem),
    /// Model reasoning summary.
    Reasoning(ReasoningItem),
    /// Shell command run by the agent.
    CommandExecution(CommandExecutionItem),
    /// File edits proposed or applied.
    FileChange(FileChangeItem),
    /// Call to an MCP tool.
    McpToolCall(McpToolCallItem),
    /// Web search.
    WebSearch(WebSearchItem),
    /// Agent plan / to-do list (`todoList`, also accepted as `plan`).
    TodoList(TodoListItem),
    /// The thread switched into review mode.
    EnteredReviewMode(ReviewModeItem),
    /// The thread left review mode; `review` carries the findings.
    ExitedReviewMode(ReviewModeItem),
    /// A kind this client does not model.
    Unknown {
        /// Raw `type` value.
        item_type: String,
        /// Remaining fields, untouched.
        fields: Map<String, Value>,
    },
}

/// Payload of a `userMessage` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessageItem {
    /// Input parts as sent by the client.
    #[serde(default)]
    pub content: Vec<Value>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of an `agentMessage` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessageItem {
    /// Full message text.
    pub text: String,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `reasoning` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningItem {
    /// Summary paragraphs.
    #[serde(default)]
    pub summary: Vec<String>,
    /// Raw reasoning paragraphs, when exposed.
    #[serde(default)]
    pub content: Vec<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `commandExecution` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecutionItem {
    /// Command line as executed.
    pub command: String,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Execution status reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Combined stdout and stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_output: Option<String>,
    /// Process exit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `fileChange` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeItem {
    /// Per-file changes.
    #[serde(default)]
    pub changes: Vec<Value>,
    /// Execution status reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of an `mcpToolCall` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolCallItem {
    /// MCP server name.
    pub server: String,
    /// Tool name.
    pub tool: String,
    /// Execution status reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Call arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Tool result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Tool error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `webSearch` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchItem {
    /// Search query.
    #[serde(default)]
    pub query: String,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `todoList` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListItem {
    /// Plan entries.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of the review-mode marker items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewModeItem {
    /// Review text.
    #[serde(default)]
    pub review: String,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadItem {
    /// Wire value of the `type` tag.
    #[must_use]
    pub fn item_type(&self) -> &str {
        match &self.details {
            ItemDetails::UserMessage(_) => "userMessage",
            ItemDetails::AgentMessage(_) => "agentMessage",
            ItemDetails::Reasoning(_) => "reasoning",
            ItemDetails::CommandExecution(_) => "commandExecution",
            ItemDetails::FileChange(_) => "fileChange",
            ItemDetails::McpToolCall(_) => "mcpToolCall",
            ItemDetails::WebSearch(_) => "webSearch",
            ItemDetails::TodoList(_) => "todoList",
            ItemDetails::EnteredReviewMode(_) => "enteredReviewMode",
            ItemDetails::ExitedReviewMode(_) => "exitedReviewMode",
            ItemDetails::Unknown { item_type, .. } => item_type,
        }
    }

    /// Text of an agent-message item.
    #[must_use]
    pub fn agent_text(&self) -> Option<&str> {
        match &self.details {
            ItemDetails::AgentMessage(item) => Some(&item.text),
            _ => None,
        }
    }

    /// Review text of an entered/exited review-mode item.
    #[must_use]
    pub fn review_text(&self) -> Option<&str> {
        match &self.details {
            ItemDetails::EnteredReviewMode(item) | ItemDetails::ExitedReviewMode(item) => {
                Some(&item.review)
            }
            _ => None,
        }
    }
}

fn payload<T, E>(fields: Map<String, Value>) -> Result<T, E>
where
    T: DeserializeOwned,
    E: serde::de::Error,
{
    serde_json::from_value(Value::Object(fields)).map_err(E::custom)
}

impl<'de> Deserialize<'de> for ThreadItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err(serde::de::Error::custom("thread item missing string id")),
        };
        let item_type = match fields.remove("type") {
            Some(Value::String(t)) => t,
            _ => return Err(serde::de::Error::custom("thread item missing string type")),
        };

        let details = match item_type.as_str() {
            "userMessage" => ItemDetails::UserMessage(payload(fields)?),
            "agentMessage" => ItemDetails::AgentMessage(payload(fields)?),
            "reasoning" => ItemDetails::Reasoning(payload(fields)?),
            "commandExecution" => ItemDetails::CommandExecution(payload(fields)?),
            "fileChange" => ItemDetails::FileChange(payload(fields)?),
            "mcpToolCall" => ItemDetails::McpToolCall(payload(fields)?),
            "webSearch" => ItemDetails::WebSearch(payload(fields)?),
            "todoList" | "plan" => ItemDetails::TodoList(payload(fields)?),
            "enteredReviewMode" => ItemDetails::EnteredReviewMode(payload(fields)?),
            "exitedReviewMode" => ItemDetails::ExitedReviewMode(payload(fields)?),
            _ => ItemDetails::Unknown { item_type, fields },
        };

        Ok(Self { id, details })
    }
}

impl Serialize for ThreadItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let object = match &self.details {
            ItemDetails::UserMessage(d) => serde_json::to_value(d),
            ItemDetails::AgentMessage(d) => serde_json::to_value(d),
            ItemDetails::Reasoning(d) => serde_json::to_value(d),
            ItemDetails::CommandExecution(d) => serde_json::to_value(d),
            ItemDetails::FileChange(d) => serde_json::to_value(d),
            ItemDetails::McpToolCall(d) => serde_json::to_value(d),
            ItemDetails::WebSearch(d) => serde_json::to_value(d),
            ItemDetails::TodoList(d) => serde_json::to_value(d),
            ItemDetails::EnteredReviewMode(d) | ItemDetails::ExitedReviewMode(d) => {
                serde_json::to_value(d)
            }
            ItemDetails::Unknown { fields, .. } => Ok(Value::Object(fields.clone())),
        }
        .map_err(serde::ser::Error::custom)?;

        let Value::Object(mut fields) = object else {
            return Err(serde::ser::Error::custom("thread item payload must serialize to an object"));
        };
        fields.insert("id".to_owned(), Value::String(self.id.clone()));
        fields.insert("type".to_owned(), Value::String(self.item_type().to_owned()));
        Value::Object(fields).serialize(serializer)
    }
}
