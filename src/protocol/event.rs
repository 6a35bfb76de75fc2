use serde_json::Value;

use super::frame::Frame;
use crate::error::ConsoleError;

pub const TOKEN_EVENT: &str = "token";
pub const AGENT_END_EVENT: &str = "agent_end";

/// A decoded frame, interpreted by event name.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Next slice of the assistant's reply.
    Token { delta: String },
    /// The agent finished; its payload is not interpreted.
    AgentEnd,
    /// Any event this console does not know. Kept for logging only.
    Other { name: String },
}

impl RunEvent {
    /// Parses the frame's data as JSON and maps it by event name.
    ///
    /// Every frame must carry JSON, including frames with unknown names. A
    /// `token` frame whose `delta` is missing or not a string yields an empty
    /// delta.
    pub fn from_frame(frame: &Frame) -> Result<Self, ConsoleError> {
        let payload: Value =
            serde_json::from_str(&frame.data).map_err(|source| ConsoleError::MalformedPayload {
                event: frame.event.clone(),
                source,
            })?;
        Ok(match frame.event.as_str() {
            TOKEN_EVENT => RunEvent::Token {
                delta: payload
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            AGENT_END_EVENT => RunEvent::AgentEnd,
            other => RunEvent::Other {
                name: other.to_string(),
            },
        })
    }

    /// True when the event requires an authoritative reload.
    pub fn ends_run(&self) -> bool {
        matches!(self, RunEvent::AgentEnd)
    }
}
