//! Wire types for the conversation store and the agent run service.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: String,
}

/// A chat message. Store-issued ids are opaque; locally synthesized ones start
/// with [`LOCAL_ID_PREFIX`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

pub const LOCAL_ID_PREFIX: &str = "local-";

impl Message {
    /// True for optimistic placeholders that the store has never seen.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub id: String,
    pub conversation_id: String,
    pub step_type: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub conversation_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub input_payload: Option<serde_json::Value>,
    /// Absent until the tool completes.
    #[serde(default)]
    pub output_payload: Option<serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub trace_steps: Vec<TraceStep>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Serialize)]
pub(crate) struct CreateConversationPayload<'a> {
    pub title: Option<&'a str>,
}

#[derive(Serialize)]
pub(crate) struct RunPayload<'a> {
    pub user_message: &'a str,
}
