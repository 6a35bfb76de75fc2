use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::dispatch::{self, DispatchEffect};
use super::messages::MessageLog;
use super::pump::{RunOutcome, RunPump, RunRequest, StreamUpdate};
use super::stream::{RunId, StreamSession};
use super::telemetry::TelemetryPoller;
use crate::error::ConsoleError;
use crate::store::{Conversation, ConversationStore, Message};

/// Where the controller is in the send lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NoConversation,
    Idle,
    Streaming,
}

/// What [`SessionController::apply`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The update belonged to a run that is no longer current.
    Stale,
    /// The draft changed.
    Draft,
    /// The agent signalled the end of its reply.
    AgentEnded,
    /// History was replaced with the store's copy.
    Reconciled,
    /// The run finalized and the streaming flag is cleared.
    Finished,
    Ignored,
}

/// Owns the state of the selected conversation and sequences
/// create → send → stream → finalize.
///
/// All mutation happens on the owner's task: run pumps report through the
/// update channel and [`SessionController::apply`] folds their updates in.
pub struct SessionController {
    store: Arc<dyn ConversationStore>,
    telemetry: TelemetryPoller,
    conversation: Option<Conversation>,
    messages: MessageLog,
    stream: Option<StreamSession>,
    pump: Option<JoinHandle<()>>,
    next_run: u64,
    updates_tx: UnboundedSender<StreamUpdate>,
    updates_rx: UnboundedReceiver<StreamUpdate>,
}

impl SessionController {
    pub fn new(store: Arc<dyn ConversationStore>, telemetry: TelemetryPoller) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            store,
            telemetry,
            conversation: None,
            messages: MessageLog::new(),
            stream: None,
            pump: None,
            next_run: 1,
            updates_tx,
            updates_rx,
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation
            .as_ref()
            .map(|conversation| conversation.id.as_str())
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.messages()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&StreamSession> {
        self.stream.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.conversation, &self.stream) {
            (None, _) => SessionPhase::NoConversation,
            (Some(_), None) => SessionPhase::Idle,
            (Some(_), Some(_)) => SessionPhase::Streaming,
        }
    }

    pub fn telemetry(&self) -> &TelemetryPoller {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryPoller {
        &mut self.telemetry
    }

    pub fn can_send(&self, input: &str) -> bool {
        self.phase() == SessionPhase::Idle && !input.trim().is_empty()
    }

    /// Creates a conversation in the store and switches to it.
    pub async fn create_conversation(&mut self, title: &str) -> Result<&Conversation, ConsoleError> {
        let title = Some(title).filter(|title| !title.trim().is_empty());
        let conversation = self.store.create_conversation(title).await?;
        info!("created conversation {}", conversation.id);
        self.switch_to(conversation);
        self.conversation
            .as_ref()
            .ok_or(ConsoleError::NoConversation)
    }

    /// Loads an existing conversation and switches to it.
    pub async fn open_conversation(&mut self, conversation_id: &str) -> Result<(), ConsoleError> {
        let history = self.store.history(conversation_id.trim()).await?;
        info!(
            "opened conversation {} ({} messages)",
            history.conversation.id,
            history.messages.len()
        );
        self.switch_to(history.conversation);
        self.messages.replace_all(history.messages);
        Ok(())
    }

    /// Replaces the message sequence with the store's copy.
    pub async fn reload_history(&mut self) -> Result<(), ConsoleError> {
        let conversation_id = self
            .conversation_id()
            .ok_or(ConsoleError::NoConversation)?
            .to_string();
        let history = self.store.history(&conversation_id).await?;
        if history.conversation.id != conversation_id {
            warn!(
                "history for {} came back as {}",
                conversation_id, history.conversation.id
            );
        }
        self.conversation = Some(history.conversation);
        self.messages.replace_all(history.messages);
        Ok(())
    }

    /// Reloads history, then waits for a telemetry refresh.
    pub async fn refresh(&mut self) -> Result<(), ConsoleError> {
        self.reload_history().await?;
        self.telemetry.handle().refresh_and_wait().await?;
        Ok(())
    }

    /// Fetches telemetry now and reports how the fetch went.
    pub async fn refresh_telemetry(&self) -> Result<(), ConsoleError> {
        if self.telemetry.handle().refresh_and_wait().await? {
            Ok(())
        } else {
            Err(ConsoleError::NoConversation)
        }
    }

    /// Starts a run for `text` in the selected conversation.
    ///
    /// The placeholders are in the message sequence before the request leaves;
    /// the reply then arrives through [`SessionController::next_update`].
    pub fn send(&mut self, text: &str) -> Result<RunId, ConsoleError> {
        let conversation_id = self
            .conversation_id()
            .ok_or(ConsoleError::NoConversation)?
            .to_string();
        let text = text.trim();
        if text.is_empty() {
            return Err(ConsoleError::EmptyMessage);
        }
        if self.stream.is_some() {
            return Err(ConsoleError::StreamInProgress);
        }

        let run = RunId(self.next_run);
        self.next_run += 1;
        let turn = self.messages.push_optimistic_turn(&conversation_id, text);
        debug!(
            "{}: placeholders {} / {}",
            run, turn.user_id, turn.assistant_id
        );
        self.stream = Some(StreamSession::new(run, conversation_id.clone()));

        let pump = RunPump::new(
            Arc::clone(&self.store),
            self.telemetry.handle(),
            self.updates_tx.clone(),
        );
        self.pump = Some(pump.spawn(RunRequest {
            run,
            conversation_id,
            user_message: text.to_string(),
        }));
        info!("{}: sent {} chars", run, text.chars().count());
        Ok(run)
    }

    /// Waits for the next update from a run pump.
    pub async fn next_update(&mut self) -> Option<StreamUpdate> {
        self.updates_rx.recv().await
    }

    /// Folds one pump update into the session.
    ///
    /// Rejected frames and failed runs come back as errors for the caller to
    /// surface; the session has already been updated (and, for `Finished`,
    /// finalized) by then.
    pub fn apply(&mut self, update: StreamUpdate) -> Result<Applied, ConsoleError> {
        let current = self.stream.as_ref().map(StreamSession::run);
        if current != Some(update.run()) {
            debug!("dropping update from stale {}", update.run());
            return Ok(Applied::Stale);
        }

        match update {
            StreamUpdate::Event { event, .. } => {
                let Some(session) = self.stream.as_mut() else {
                    return Ok(Applied::Stale);
                };
                Ok(
                    match dispatch::apply_event(session, &mut self.messages, &event) {
                        DispatchEffect::DraftUpdated | DispatchEffect::DraftOrphaned => {
                            Applied::Draft
                        }
                        DispatchEffect::ReloadRequested => Applied::AgentEnded,
                        DispatchEffect::Ignored => Applied::Ignored,
                    },
                )
            }
            StreamUpdate::Rejected { error, .. } => Err(error),
            StreamUpdate::Reconciled { history, .. } => {
                self.conversation = Some(history.conversation);
                self.messages.replace_all(history.messages);
                Ok(Applied::Reconciled)
            }
            StreamUpdate::Finished { run, outcome } => {
                let session = self.stream.take();
                self.pump = None;
                let tokens = session.as_ref().map_or(0, StreamSession::tokens);
                match outcome {
                    RunOutcome::Completed => {
                        info!("{}: finished after {} tokens", run, tokens);
                        Ok(Applied::Finished)
                    }
                    RunOutcome::Abandoned => {
                        warn!("{}: abandoned after {} tokens", run, tokens);
                        Ok(Applied::Finished)
                    }
                    RunOutcome::Failed(err) => {
                        error!("{}: failed after {} tokens: {}", run, tokens, err);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Makes `conversation` current. A different conversation discards the
    /// in-flight run, the message sequence and the telemetry poll.
    fn switch_to(&mut self, conversation: Conversation) {
        let same = self.conversation_id() == Some(conversation.id.as_str());
        if !same {
            self.discard_stream();
            self.messages.clear();
            self.telemetry.start(&conversation.id);
        }
        self.conversation = Some(conversation);
    }

    fn discard_stream(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(session) = self.stream.take() {
            info!(
                "{}: discarded with conversation {}",
                session.run(),
                session.conversation_id()
            );
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
