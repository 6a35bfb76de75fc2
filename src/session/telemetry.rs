//! Telemetry poller: keeps the trace-step and tool-call views of the selected
//! conversation fresh, independently of any run stream.
//!
//! Every successful fetch replaces the whole view. Nothing is merged or
//! deduplicated; the latest snapshot from the store is the truth.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ConsoleError;
use crate::store::{ConversationStore, Telemetry, ToolCall, TraceStep};

/// Latest telemetry snapshot of one conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryView {
    pub conversation_id: Option<String>,
    pub trace_steps: Vec<TraceStep>,
    pub tool_calls: Vec<ToolCall>,
}

impl TelemetryView {
    fn empty_for(conversation_id: &str) -> Self {
        Self {
            conversation_id: Some(conversation_id.to_string()),
            ..Self::default()
        }
    }

    fn from_telemetry(conversation_id: &str, telemetry: Telemetry) -> Self {
        Self {
            conversation_id: Some(conversation_id.to_string()),
            trace_steps: telemetry.trace_steps,
            tool_calls: telemetry.tool_calls,
        }
    }
}

#[derive(Debug)]
enum PollCommand {
    /// Fetch now and report the outcome to the requester.
    Refresh(oneshot::Sender<Result<(), ConsoleError>>),
    SetAuto(bool),
}

/// Cloneable trigger for on-demand refreshes of the active poll.
///
/// Bound to the conversation that was active when it was created; once that
/// poll stops, refreshes through the handle report `Ok(false)`.
#[derive(Clone, Debug)]
pub struct TelemetryHandle {
    commands: Option<mpsc::UnboundedSender<PollCommand>>,
}

impl TelemetryHandle {
    /// A handle that is not attached to any poll.
    pub fn detached() -> Self {
        Self { commands: None }
    }

    /// Fetches right away and waits for the outcome.
    ///
    /// `Ok(false)` means no poll was there to refresh; a failed fetch comes
    /// back as the store's error and leaves the view untouched.
    pub async fn refresh_and_wait(&self) -> Result<bool, ConsoleError> {
        let Some(commands) = self.commands.as_ref() else {
            return Ok(false);
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if commands.send(PollCommand::Refresh(ack_tx)).is_err() {
            return Ok(false);
        }
        match ack_rx.await {
            Ok(outcome) => outcome.map(|()| true),
            // The poll was stopped while the fetch was in flight.
            Err(_) => Ok(false),
        }
    }
}

struct ActivePoll {
    conversation_id: String,
    commands: mpsc::UnboundedSender<PollCommand>,
    task: JoinHandle<()>,
}

/// Owns the [`TelemetryView`] and the background task that refreshes it.
pub struct TelemetryPoller {
    store: Arc<dyn ConversationStore>,
    cadence: Duration,
    auto_refresh: bool,
    view: watch::Sender<TelemetryView>,
    /// Bumped on every stop; a task only publishes while its generation is current.
    generation: Arc<AtomicU64>,
    active: Option<ActivePoll>,
}

impl TelemetryPoller {
    pub fn new(store: Arc<dyn ConversationStore>, cadence: Duration, auto_refresh: bool) -> Self {
        let (view, _) = watch::channel(TelemetryView::default());
        Self {
            store,
            cadence,
            auto_refresh,
            view,
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    /// Receiver for render-time snapshots; `changed()` fires on real changes only.
    pub fn subscribe(&self) -> watch::Receiver<TelemetryView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> TelemetryView {
        self.view.borrow().clone()
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|active| active.conversation_id.as_str())
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    /// Starts polling `conversation_id`, stopping any previous poll first.
    ///
    /// Fetches once right away, then every cadence tick while auto refresh is on.
    pub fn start(&mut self, conversation_id: &str) {
        self.stop();
        let generation = self.generation.load(Ordering::SeqCst);
        self.view
            .send_replace(TelemetryView::empty_for(conversation_id));

        let (commands, receiver) = mpsc::unbounded_channel();
        let task = PollTask {
            store: Arc::clone(&self.store),
            conversation_id: conversation_id.to_string(),
            view: self.view.clone(),
            generation: Arc::clone(&self.generation),
            own_generation: generation,
            cadence: self.cadence,
            auto_refresh: self.auto_refresh,
        };
        info!(
            "telemetry polling started for {} every {:?} (auto: {})",
            conversation_id, self.cadence, self.auto_refresh
        );
        self.active = Some(ActivePoll {
            conversation_id: conversation_id.to_string(),
            commands,
            task: tokio::spawn(task.run(receiver)),
        });
    }

    /// Stops polling and clears the view.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = self.active.take() {
            active.task.abort();
            debug!("telemetry polling stopped for {}", active.conversation_id);
        }
        self.view.send_if_modified(|view| {
            if *view == TelemetryView::default() {
                false
            } else {
                *view = TelemetryView::default();
                true
            }
        });
    }

    pub fn handle(&self) -> TelemetryHandle {
        TelemetryHandle {
            commands: self.active.as_ref().map(|active| active.commands.clone()),
        }
    }

    /// Pauses or resumes cadence ticks. On-demand refreshes keep working.
    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.auto_refresh = enabled;
        if let Some(active) = self.active.as_ref() {
            let _ = active.commands.send(PollCommand::SetAuto(enabled));
        }
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

struct PollTask {
    store: Arc<dyn ConversationStore>,
    conversation_id: String,
    view: watch::Sender<TelemetryView>,
    generation: Arc<AtomicU64>,
    own_generation: u64,
    cadence: Duration,
    auto_refresh: bool,
}

impl PollTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PollCommand>) {
        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and stands for the initial load.
        ticker.tick().await;
        self.fetch_in_background().await;

        loop {
            tokio::select! {
                _ = ticker.tick(), if self.auto_refresh => self.fetch_in_background().await,
                command = commands.recv() => match command {
                    Some(PollCommand::Refresh(ack)) => {
                        let outcome = self.fetch().await;
                        if let Err(err) = &outcome {
                            debug!(
                                "requested telemetry refresh for {} failed: {}",
                                self.conversation_id, err
                            );
                        }
                        let _ = ack.send(outcome);
                    }
                    Some(PollCommand::SetAuto(enabled)) => {
                        self.auto_refresh = enabled;
                        if enabled {
                            ticker.reset();
                        }
                    }
                    None => break,
                },
            }
        }
    }

    /// Cadence ticks and the initial load have nobody to report to.
    async fn fetch_in_background(&self) {
        if let Err(err) = self.fetch().await {
            warn!(
                "telemetry poll for {} failed, retrying next tick: {}",
                self.conversation_id, err
            );
        }
    }

    async fn fetch(&self) -> Result<(), ConsoleError> {
        let telemetry = self.store.telemetry(&self.conversation_id).await?;
        if self.publish(telemetry) {
            debug!("telemetry for {} updated", self.conversation_id);
        }
        Ok(())
    }

    /// Replaces the view unless this task has been superseded. Returns whether
    /// the view actually changed.
    fn publish(&self, telemetry: Telemetry) -> bool {
        let next = TelemetryView::from_telemetry(&self.conversation_id, telemetry);
        self.view.send_if_modified(|view| {
            if self.generation.load(Ordering::SeqCst) != self.own_generation || *view == next {
                return false;
            }
            *view = next;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{FakeStore, tool_call, trace_step};

    const CADENCE: Duration = Duration::from_millis(1500);

    fn poller(store: &Arc<FakeStore>, auto: bool) -> TelemetryPoller {
        TelemetryPoller::new(store.clone(), CADENCE, auto)
    }

    #[tokio::test]
    async fn start_loads_and_replaces_the_view() {
        let store = FakeStore::shared();
        store.set_telemetry("c1", vec![trace_step("s1", "c1", "planner")], vec![]);
        let mut poller = poller(&store, false);

        poller.start("c1");
        assert!(poller.handle().refresh_and_wait().await.unwrap());

        let view = poller.snapshot();
        assert_eq!(view.conversation_id.as_deref(), Some("c1"));
        assert_eq!(view.trace_steps.len(), 1);
        assert!(view.tool_calls.is_empty());

        store.set_telemetry(
            "c1",
            vec![trace_step("s2", "c1", "supervisor")],
            vec![tool_call("t1", "c1", "mock_policy_kb_search")],
        );
        assert!(poller.handle().refresh_and_wait().await.unwrap());
        let view = poller.snapshot();
        assert_eq!(view.trace_steps[0].id, "s2");
        assert_eq!(view.tool_calls[0].tool_name, "mock_policy_kb_search");
    }

    #[tokio::test]
    async fn unchanged_snapshot_is_not_observable() {
        let store = FakeStore::shared();
        store.set_telemetry("c1", vec![trace_step("s1", "c1", "planner")], vec![]);
        let mut poller = poller(&store, false);
        let mut receiver = poller.subscribe();

        poller.start("c1");
        assert!(poller.handle().refresh_and_wait().await.unwrap());
        let first = receiver.borrow_and_update().clone();

        assert!(poller.handle().refresh_and_wait().await.unwrap());
        assert!(poller.handle().refresh_and_wait().await.unwrap());
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow(), first);
        assert!(store.telemetry_calls() >= 3);
    }

    #[tokio::test]
    async fn failures_keep_the_previous_view() {
        let store = FakeStore::shared();
        store.set_telemetry("c1", vec![trace_step("s1", "c1", "planner")], vec![]);
        let mut poller = poller(&store, false);
        poller.start("c1");
        assert!(poller.handle().refresh_and_wait().await.unwrap());

        store.fail_telemetry(true);
        assert!(matches!(
            poller.handle().refresh_and_wait().await,
            Err(ConsoleError::RequestFailed { status: Some(503), .. })
        ));
        assert_eq!(poller.snapshot().trace_steps[0].id, "s1");

        store.fail_telemetry(false);
        store.set_telemetry("c1", vec![], vec![]);
        assert!(poller.handle().refresh_and_wait().await.unwrap());
        assert!(poller.snapshot().trace_steps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_cadence() {
        let store = FakeStore::shared();
        let mut poller = poller(&store, true);
        poller.start("c1");

        tokio::time::sleep(CADENCE * 3 + Duration::from_millis(100)).await;
        // Initial load plus three ticks.
        assert_eq!(store.telemetry_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_refresh_can_be_paused_and_resumed() {
        let store = FakeStore::shared();
        let mut poller = poller(&store, true);
        poller.start("c1");
        poller.set_auto_refresh(false);

        tokio::time::sleep(CADENCE * 4).await;
        assert_eq!(store.telemetry_calls(), 1);

        assert!(poller.handle().refresh_and_wait().await.unwrap());
        assert_eq!(store.telemetry_calls(), 2);

        poller.set_auto_refresh(true);
        tokio::time::sleep(CADENCE * 2 + Duration::from_millis(100)).await;
        assert_eq!(store.telemetry_calls(), 4);
    }

    #[tokio::test]
    async fn switching_conversations_isolates_views() {
        let store = FakeStore::shared();
        store.set_telemetry("c1", vec![trace_step("s1", "c1", "planner")], vec![]);
        store.set_telemetry("c2", vec![], vec![tool_call("t9", "c2", "search")]);
        let mut poller = poller(&store, false);

        poller.start("c1");
        let stale = poller.handle();
        assert!(stale.refresh_and_wait().await.unwrap());

        poller.start("c2");
        assert_eq!(poller.active_conversation(), Some("c2"));
        assert!(!stale.refresh_and_wait().await.unwrap());
        assert!(poller.handle().refresh_and_wait().await.unwrap());

        let view = poller.snapshot();
        assert_eq!(view.conversation_id.as_deref(), Some("c2"));
        assert!(view.trace_steps.is_empty());
        assert_eq!(view.tool_calls[0].id, "t9");
    }

    #[tokio::test(start_paused = true)]
    async fn background_failures_do_not_stop_the_poll() {
        let store = FakeStore::shared();
        store.fail_telemetry(true);
        let mut poller = poller(&store, true);
        poller.start("c1");

        tokio::time::sleep(CADENCE * 2 + Duration::from_millis(100)).await;
        assert_eq!(store.telemetry_calls(), 3);
        assert_eq!(poller.active_conversation(), Some("c1"));
        assert!(poller.snapshot().trace_steps.is_empty());
    }

    #[tokio::test]
    async fn superseded_fetch_cannot_overwrite_the_new_conversation() {
        let store = FakeStore::shared();
        store.set_telemetry("c1", vec![trace_step("s1", "c1", "planner")], vec![]);
        store.set_telemetry("c2", vec![], vec![tool_call("t9", "c2", "search")]);
        let gate = store.gate_telemetry("c1");
        let mut poller = poller(&store, false);

        poller.start("c1");
        // A c1 fetch that is already past the store call when the switch happens.
        let superseded = PollTask {
            store: store.clone(),
            conversation_id: "c1".into(),
            view: poller.view.clone(),
            generation: Arc::clone(&poller.generation),
            own_generation: poller.generation.load(Ordering::SeqCst),
            cadence: CADENCE,
            auto_refresh: false,
        };
        let in_flight = tokio::spawn(async move { superseded.fetch().await });

        poller.start("c2");
        assert!(poller.handle().refresh_and_wait().await.unwrap());
        gate.notify_one();
        assert!(in_flight.await.unwrap().is_ok());

        let view = poller.snapshot();
        assert_eq!(view.conversation_id.as_deref(), Some("c2"));
        assert!(view.trace_steps.is_empty());
        assert_eq!(view.tool_calls[0].id, "t9");
    }

    #[tokio::test]
    async fn stop_clears_the_view_and_detaches_handles() {
        let store = FakeStore::shared();
        store.set_telemetry("c1", vec![trace_step("s1", "c1", "planner")], vec![]);
        let mut poller = poller(&store, false);
        poller.start("c1");
        let handle = poller.handle();
        assert!(handle.refresh_and_wait().await.unwrap());

        poller.stop();
        assert_eq!(poller.snapshot(), TelemetryView::default());
        assert!(!handle.refresh_and_wait().await.unwrap());
        assert!(!TelemetryHandle::detached().refresh_and_wait().await.unwrap());
    }
}
