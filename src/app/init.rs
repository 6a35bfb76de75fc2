use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use super::{App, Composer, StatusLine};
use crate::config::ConsoleSettings;
use crate::session::{SessionController, TelemetryPoller, TelemetryView};
use crate::store::ConversationStore;

pub(crate) const IDLE_HINT: &str = "Ctrl+N new conversation · Ctrl+O open by id · Ctrl+Q quit";

impl App {
    /// Creates the application state around `store`.
    ///
    /// Nothing is fetched yet; telemetry polling starts once a conversation is selected.
    pub fn new(settings: ConsoleSettings, store: Arc<dyn ConversationStore>) -> Self {
        debug!(
            "initializing console against {} ({})",
            settings.api_base,
            store.name()
        );
        let poller = TelemetryPoller::new(
            Arc::clone(&store),
            settings.telemetry_interval(),
            settings.auto_telemetry,
        );
        let telemetry_rx = poller.subscribe();

        Self {
            should_quit: false,
            session: SessionController::new(store, poller),
            composer: Composer::new(),
            overlay: None,
            status: StatusLine::info(IDLE_HINT),
            show_payloads: false,
            chat_scroll: 0,
            telemetry_view: TelemetryView::default(),
            telemetry_rx,
            settings,
            spinner: 0,
            last_tick: Instant::now(),
            tick_rate: Duration::from_millis(250),
        }
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }
}
