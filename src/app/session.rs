use log::{debug, error};

use super::{App, StatusLine};
use crate::error::ConsoleError;
use crate::session::{Applied, StreamUpdate};

impl App {
    /// Folds a run update into the session and reports what happened.
    pub(crate) fn apply_stream_update(&mut self, update: StreamUpdate) {
        match self.session.apply(update) {
            Ok(Applied::Draft) | Ok(Applied::Ignored) | Ok(Applied::Stale) => {}
            Ok(Applied::AgentEnded) => self.notice("Agent finished, syncing history"),
            Ok(Applied::Reconciled) => self.notice("History synced"),
            Ok(Applied::Finished) => {
                let count = self.session.messages().len();
                self.notice(format!("Reply complete · {count} messages"));
            }
            Err(err) => self.report_error(err),
        }
    }

    /// Copies the latest telemetry snapshot into the render state.
    pub(crate) fn sync_telemetry(&mut self) {
        self.telemetry_view = self.telemetry_rx.borrow_and_update().clone();
        debug!(
            "telemetry view: {} steps, {} tool calls",
            self.telemetry_view.trace_steps.len(),
            self.telemetry_view.tool_calls.len()
        );
    }

    pub(crate) fn notice(&mut self, text: impl Into<String>) {
        self.status = StatusLine::info(text);
    }

    pub(crate) fn report_error(&mut self, err: ConsoleError) {
        if err.is_frame_level() {
            self.status = StatusLine::error(format!("Skipped a frame: {err}"));
        } else {
            error!("{}", err);
            self.status = StatusLine::error(err.to_string());
        }
    }
}
