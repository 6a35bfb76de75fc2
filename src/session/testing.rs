//! In-memory `ConversationStore` for session tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::Notify;

use crate::error::ConsoleError;
use crate::store::{
    ChunkStream, Conversation, ConversationHistory, ConversationStore, Message, Role, Telemetry,
    ToolCall, TraceStep,
};

/// Scripted response for one `open_run` call.
pub(crate) enum ScriptedRun {
    Chunks(Vec<Result<Vec<u8>, ConsoleError>>),
    /// Opens fine but never yields a chunk nor ends.
    Hang,
    Refuse(u16, &'static str),
}

#[derive(Default)]
pub(crate) struct FakeStore {
    created: AtomicUsize,
    history: Mutex<HashMap<String, Vec<Message>>>,
    telemetry: Mutex<HashMap<String, Telemetry>>,
    fail_telemetry: Mutex<bool>,
    telemetry_gates: Mutex<HashMap<String, Arc<Notify>>>,
    runs: Mutex<VecDeque<ScriptedRun>>,
    run_requests: Mutex<Vec<(String, String)>>,
    history_calls: AtomicUsize,
    telemetry_calls: AtomicUsize,
}

impl FakeStore {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_history(&self, conversation_id: &str, messages: Vec<Message>) {
        self.history
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), messages);
    }

    pub(crate) fn set_telemetry(
        &self,
        conversation_id: &str,
        trace_steps: Vec<TraceStep>,
        tool_calls: Vec<ToolCall>,
    ) {
        self.telemetry.lock().unwrap().insert(
            conversation_id.to_string(),
            Telemetry {
                trace_steps,
                tool_calls,
            },
        );
    }

    pub(crate) fn fail_telemetry(&self, fail: bool) {
        *self.fail_telemetry.lock().unwrap() = fail;
    }

    /// Holds every telemetry response for `conversation_id` until the returned
    /// gate is notified once per held call.
    pub(crate) fn gate_telemetry(&self, conversation_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.telemetry_gates
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), Arc::clone(&gate));
        gate
    }

    pub(crate) fn script_run(&self, run: ScriptedRun) {
        self.runs.lock().unwrap().push_back(run);
    }

    pub(crate) fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn telemetry_calls(&self) -> usize {
        self.telemetry_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn run_requests(&self) -> Vec<(String, String)> {
        self.run_requests.lock().unwrap().clone()
    }
}

fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        title: Some("Agent Chat".into()),
        created_at: "2024-05-01T10:00:00".into(),
    }
}

#[async_trait]
impl ConversationStore for FakeStore {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, ConsoleError> {
        let index = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let mut created = conversation(&format!("c{index}"));
        created.title = title.map(str::to_string);
        Ok(created)
    }

    async fn history(&self, conversation_id: &str) -> Result<ConversationHistory, ConsoleError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let messages = self.history.lock().unwrap().get(conversation_id).cloned();
        match messages {
            Some(messages) => Ok(ConversationHistory {
                conversation: conversation(conversation_id),
                messages,
            }),
            None => Err(ConsoleError::RequestFailed {
                action: "load history",
                status: Some(404),
                detail: "Conversation not found".into(),
            }),
        }
    }

    async fn telemetry(&self, conversation_id: &str) -> Result<Telemetry, ConsoleError> {
        self.telemetry_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.telemetry_gates.lock().unwrap().get(conversation_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_telemetry.lock().unwrap() {
            return Err(ConsoleError::RequestFailed {
                action: "load telemetry",
                status: Some(503),
                detail: "unavailable".into(),
            });
        }
        Ok(self
            .telemetry
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_run(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<ChunkStream, ConsoleError> {
        self.run_requests
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), user_message.to_string()));
        let scripted = self.runs.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedRun::Chunks(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(ScriptedRun::Hang) | None => {
                Ok(Box::pin(stream::pending::<Result<Vec<u8>, ConsoleError>>()))
            }
            Some(ScriptedRun::Refuse(status, detail)) => Err(ConsoleError::RequestFailed {
                action: "start run",
                status: Some(status),
                detail: detail.into(),
            }),
        }
    }
}

pub(crate) fn message(id: &str, conversation_id: &str, role: Role, content: &str) -> Message {
    Message {
        id: id.into(),
        conversation_id: conversation_id.into(),
        role,
        content: content.into(),
        created_at: "2024-05-01T10:00:00".into(),
    }
}

pub(crate) fn trace_step(id: &str, conversation_id: &str, step_type: &str) -> TraceStep {
    TraceStep {
        id: id.into(),
        conversation_id: conversation_id.into(),
        step_type: step_type.into(),
        content: format!("{step_type} output"),
        created_at: "2024-05-01T10:00:00".into(),
    }
}

pub(crate) fn tool_call(id: &str, conversation_id: &str, tool_name: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        conversation_id: conversation_id.into(),
        tool_name: tool_name.into(),
        input_payload: Some(serde_json::json!({"query": "leave policy"})),
        output_payload: None,
        created_at: "2024-05-01T10:00:00".into(),
    }
}

/// Splits `text` into chunks of `size` bytes, ignoring character boundaries.
pub(crate) fn chunked(text: &str, size: usize) -> Vec<Result<Vec<u8>, ConsoleError>> {
    text.as_bytes()
        .chunks(size)
        .map(|chunk| Ok(chunk.to_vec()))
        .collect()
}
