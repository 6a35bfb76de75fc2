//! The read loop of one agent run.
//!
//! A pump owns the response body and the frame decoder. It never touches
//! session state; everything it learns travels to the controller as
//! [`StreamUpdate`]s over a single channel, so updates arrive in decode order.

use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::stream::RunId;
use super::telemetry::TelemetryHandle;
use crate::error::ConsoleError;
use crate::protocol::{FrameDecoder, RunEvent};
use crate::store::{ConversationHistory, ConversationStore};

#[derive(Debug)]
pub enum StreamUpdate {
    /// A decoded run event, in stream order.
    Event { run: RunId, event: RunEvent },
    /// A frame whose payload could not be parsed. The stream goes on.
    Rejected { run: RunId, error: ConsoleError },
    /// Authoritative history fetched after `agent_end`.
    Reconciled {
        run: RunId,
        history: ConversationHistory,
    },
    /// Always the last update of a run, sent exactly once.
    Finished { run: RunId, outcome: RunOutcome },
}

impl StreamUpdate {
    pub fn run(&self) -> RunId {
        match self {
            StreamUpdate::Event { run, .. }
            | StreamUpdate::Rejected { run, .. }
            | StreamUpdate::Reconciled { run, .. }
            | StreamUpdate::Finished { run, .. } => *run,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The response body reached EOF.
    Completed,
    /// Opening the run, reading the body, or reconciling failed.
    Failed(ConsoleError),
    /// The pump was dropped before it could finish.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run: RunId,
    pub conversation_id: String,
    pub user_message: String,
}

pub struct RunPump {
    store: Arc<dyn ConversationStore>,
    telemetry: TelemetryHandle,
    updates: UnboundedSender<StreamUpdate>,
}

impl RunPump {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        telemetry: TelemetryHandle,
        updates: UnboundedSender<StreamUpdate>,
    ) -> Self {
        Self {
            store,
            telemetry,
            updates,
        }
    }

    /// Runs the pump on the tokio runtime.
    ///
    /// The finish guard is created before spawning so that aborting the task,
    /// even before its first poll, still reports `Finished`.
    pub fn spawn(self, request: RunRequest) -> JoinHandle<()> {
        let guard = FinishGuard::new(self.updates.clone(), request.run);
        tokio::spawn(async move {
            let outcome = match self.pump(&request).await {
                Ok(()) => RunOutcome::Completed,
                Err(err) => RunOutcome::Failed(err),
            };
            guard.complete(outcome);
        })
    }

    async fn pump(&self, request: &RunRequest) -> Result<(), ConsoleError> {
        let run = request.run;
        let mut chunks = self
            .store
            .open_run(&request.conversation_id, &request.user_message)
            .await?;
        info!("{}: streaming reply for {}", run, request.conversation_id);

        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                let event = match RunEvent::from_frame(&frame) {
                    Ok(event) => event,
                    Err(error) => {
                        warn!("{}: rejected frame: {}", run, error);
                        self.send(StreamUpdate::Rejected { run, error });
                        continue;
                    }
                };
                let ends_run = event.ends_run();
                self.send(StreamUpdate::Event { run, event });
                if ends_run {
                    self.reconcile(request).await?;
                }
            }
        }

        if let Some(tail) = decoder.finish() {
            debug!("{}: discarding unterminated frame {:?}", run, tail);
        }
        Ok(())
    }

    /// Fetches authoritative history, then waits for a telemetry refresh. A
    /// failed refresh fails the run.
    async fn reconcile(&self, request: &RunRequest) -> Result<(), ConsoleError> {
        let history = self.store.history(&request.conversation_id).await?;
        debug!(
            "{}: reconciled {} messages",
            request.run,
            history.messages.len()
        );
        self.send(StreamUpdate::Reconciled {
            run: request.run,
            history,
        });
        if !self.telemetry.refresh_and_wait().await? {
            debug!("{}: no telemetry poll to refresh", request.run);
        }
        Ok(())
    }

    fn send(&self, update: StreamUpdate) {
        // The controller may be gone already (e.g. on quit); nothing left to update.
        let _ = self.updates.send(update);
    }
}

/// Emits `Finished` when dropped, whichever way the pump ends.
struct FinishGuard {
    updates: UnboundedSender<StreamUpdate>,
    run: RunId,
    outcome: Option<RunOutcome>,
}

impl FinishGuard {
    fn new(updates: UnboundedSender<StreamUpdate>, run: RunId) -> Self {
        Self {
            updates,
            run,
            outcome: None,
        }
    }

    fn complete(mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(RunOutcome::Abandoned);
        let _ = self.updates.send(StreamUpdate::Finished {
            run: self.run,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::session::telemetry::TelemetryPoller;
    use crate::session::testing::{FakeStore, ScriptedRun, chunked, message};
    use crate::store::Role;

    const TEST_TIMEOUT: Duration = Duration::from_secs(3);

    fn request(run: u64) -> RunRequest {
        RunRequest {
            run: RunId(run),
            conversation_id: "c1".into(),
            user_message: "hello".into(),
        }
    }

    async fn collect(mut updates: mpsc::UnboundedReceiver<StreamUpdate>) -> Vec<StreamUpdate> {
        timeout(TEST_TIMEOUT, async {
            let mut collected = Vec::new();
            while let Some(update) = updates.recv().await {
                let finished = matches!(update, StreamUpdate::Finished { .. });
                collected.push(update);
                if finished {
                    break;
                }
            }
            collected
        })
        .await
        .expect("pump did not finish")
    }

    #[tokio::test]
    async fn forwards_events_in_order_and_reconciles_after_agent_end() {
        let store = FakeStore::shared();
        store.set_history(
            "c1",
            vec![
                message("m1", "c1", Role::User, "hello"),
                message("m2", "c1", Role::Assistant, "Hi there"),
            ],
        );
        store.script_run(ScriptedRun::Chunks(chunked(
            concat!(
                "event: token\ndata: {\"delta\":\"Hi\"}\n\n",
                "event: node\ndata: {\"node\":\"planner\"}\n\n",
                "event: token\ndata: {\"delta\":\" there\"}\n\n",
                "event: agent_end\ndata: {}\n\n",
            ),
            7,
        )));
        let (tx, rx) = mpsc::unbounded_channel();

        RunPump::new(store.clone(), TelemetryHandle::detached(), tx).spawn(request(1));
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 6);
        assert!(matches!(
            &updates[0],
            StreamUpdate::Event { event: RunEvent::Token { delta }, .. } if delta == "Hi"
        ));
        assert!(matches!(
            &updates[1],
            StreamUpdate::Event { event: RunEvent::Other { name }, .. } if name == "node"
        ));
        assert!(matches!(
            &updates[2],
            StreamUpdate::Event { event: RunEvent::Token { delta }, .. } if delta == " there"
        ));
        assert!(matches!(
            &updates[3],
            StreamUpdate::Event { event: RunEvent::AgentEnd, .. }
        ));
        assert!(matches!(
            &updates[4],
            StreamUpdate::Reconciled { history, .. } if history.messages.len() == 2
        ));
        assert!(matches!(
            &updates[5],
            StreamUpdate::Finished { outcome: RunOutcome::Completed, .. }
        ));
        assert!(updates.iter().all(|update| update.run() == RunId(1)));
        assert_eq!(store.history_calls(), 1);
        assert_eq!(
            store.run_requests(),
            vec![("c1".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_rejected_and_stream_continues() {
        let store = FakeStore::shared();
        store.script_run(ScriptedRun::Chunks(chunked(
            concat!(
                "event: token\ndata: {not json}\n\n",
                "event: token\ndata: {\"delta\":\"ok\"}\n\n",
            ),
            64,
        )));
        let (tx, rx) = mpsc::unbounded_channel();

        RunPump::new(store.clone(), TelemetryHandle::detached(), tx).spawn(request(2));
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 3);
        assert!(matches!(
            &updates[0],
            StreamUpdate::Rejected { error: ConsoleError::MalformedPayload { .. }, .. }
        ));
        assert!(matches!(&updates[1], StreamUpdate::Event { .. }));
        assert!(matches!(
            &updates[2],
            StreamUpdate::Finished { outcome: RunOutcome::Completed, .. }
        ));
        assert_eq!(store.history_calls(), 0);
    }

    #[tokio::test]
    async fn transport_error_finishes_with_failure() {
        let store = FakeStore::shared();
        let mut chunks = chunked("event: token\ndata: {\"delta\":\"par\"}\n\n", 64);
        chunks.push(Err(ConsoleError::StreamTransport("connection reset".into())));
        chunks.extend(chunked("event: token\ndata: {\"delta\":\"never\"}\n\n", 64));
        store.script_run(ScriptedRun::Chunks(chunks));
        let (tx, rx) = mpsc::unbounded_channel();

        RunPump::new(store.clone(), TelemetryHandle::detached(), tx).spawn(request(3));
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(
            &updates[1],
            StreamUpdate::Finished {
                outcome: RunOutcome::Failed(ConsoleError::StreamTransport(_)),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn refused_run_fails_before_any_event() {
        let store = FakeStore::shared();
        store.script_run(ScriptedRun::Refuse(500, "agent crashed"));
        let (tx, rx) = mpsc::unbounded_channel();

        RunPump::new(store.clone(), TelemetryHandle::detached(), tx).spawn(request(4));
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            StreamUpdate::Finished {
                outcome: RunOutcome::Failed(ConsoleError::RequestFailed { status: Some(500), .. }),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_reconcile_still_finishes() {
        let store = FakeStore::shared();
        store.script_run(ScriptedRun::Chunks(chunked(
            "event: agent_end\ndata: {}\n\n",
            64,
        )));
        let (tx, rx) = mpsc::unbounded_channel();

        RunPump::new(store.clone(), TelemetryHandle::detached(), tx).spawn(request(5));
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(
            &updates[1],
            StreamUpdate::Finished {
                outcome: RunOutcome::Failed(ConsoleError::RequestFailed { status: Some(404), .. }),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_telemetry_refresh_fails_the_run() {
        let store = FakeStore::shared();
        store.set_history("c1", vec![message("m1", "c1", Role::User, "hello")]);
        store.fail_telemetry(true);
        store.script_run(ScriptedRun::Chunks(chunked(
            "event: agent_end\ndata: {}\n\n",
            64,
        )));
        let mut poller = TelemetryPoller::new(store.clone(), Duration::from_secs(60), false);
        poller.start("c1");
        let (tx, rx) = mpsc::unbounded_channel();

        RunPump::new(store.clone(), poller.handle(), tx).spawn(request(7));
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 3);
        assert!(matches!(&updates[1], StreamUpdate::Reconciled { .. }));
        assert!(matches!(
            &updates[2],
            StreamUpdate::Finished {
                outcome: RunOutcome::Failed(ConsoleError::RequestFailed { status: Some(503), .. }),
                ..
            }
        ));
        assert_eq!(poller.active_conversation(), Some("c1"));
    }

    #[tokio::test]
    async fn aborted_pump_reports_abandoned() {
        let store = FakeStore::shared();
        store.script_run(ScriptedRun::Hang);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = RunPump::new(store.clone(), TelemetryHandle::detached(), tx).spawn(request(6));
        task.abort();
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            StreamUpdate::Finished { run: RunId(6), outcome: RunOutcome::Abandoned }
        ));
    }
}
