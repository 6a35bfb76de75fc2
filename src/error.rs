//! Error taxonomy shared by the store client, the stream pump and the session controller.

/// Failures surfaced by the console core.
///
/// Action-triggered errors (create, reload, send) are returned to the caller of
/// that action. Background telemetry polling logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// A collaborator call returned a non-success status or never got a response.
    #[error("{action} failed{}: {detail}", status_suffix(.status))]
    RequestFailed {
        action: &'static str,
        status: Option<u16>,
        detail: String,
    },
    /// The call succeeded but the body could not be decoded.
    #[error("{action} returned an unreadable body: {source}")]
    InvalidResponse {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// A frame's data text is not valid JSON.
    #[error("malformed `{event}` payload: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    /// The connection broke after the stream started.
    #[error("stream interrupted: {0}")]
    StreamTransport(String),
    #[error("no conversation selected")]
    NoConversation,
    #[error("message is empty")]
    EmptyMessage,
    #[error("a reply is still streaming")]
    StreamInProgress,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl ConsoleError {
    pub(crate) fn request(action: &'static str, err: reqwest::Error) -> Self {
        ConsoleError::RequestFailed {
            action,
            status: err.status().map(|status| status.as_u16()),
            detail: err.to_string(),
        }
    }

    /// True for errors that reject a single frame without ending the stream.
    pub fn is_frame_level(&self) -> bool {
        matches!(self, ConsoleError::MalformedPayload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_message_includes_status() {
        let err = ConsoleError::RequestFailed {
            action: "load history",
            status: Some(404),
            detail: "Conversation not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "load history failed (404): Conversation not found"
        );
    }

    #[test]
    fn request_failed_without_status_omits_code() {
        let err = ConsoleError::RequestFailed {
            action: "create conversation",
            status: None,
            detail: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "create conversation failed: connection refused"
        );
    }

    #[test]
    fn only_malformed_payload_is_frame_level() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let malformed = ConsoleError::MalformedPayload {
            event: "token".into(),
            source,
        };
        assert!(malformed.is_frame_level());
        assert!(!ConsoleError::StreamTransport("reset".into()).is_frame_level());
    }
}
