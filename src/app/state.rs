//! Core state of the console: the session controller plus everything the
//! terminal UI needs around it (composer, overlay, status line, view toggles).

use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::Composer;
use crate::config::ConsoleSettings;
use crate::session::{SessionController, TelemetryView};

/// The main application state.
///
/// Owns the [`SessionController`]; every session mutation happens on the UI
/// task through this struct.
pub struct App {
    /// Flag to indicate if the application should quit.
    pub should_quit: bool,
    pub session: SessionController,
    pub composer: Composer,
    /// The currently active overlay, if any.
    pub overlay: Option<OverlayState>,
    pub status: StatusLine,
    /// Whether tool call payloads are expanded in the telemetry pane.
    pub show_payloads: bool,
    /// Lines scrolled up from the bottom of the chat pane.
    pub chat_scroll: u16,
    /// Last telemetry snapshot seen by the UI.
    pub telemetry_view: TelemetryView,

    pub(crate) telemetry_rx: watch::Receiver<TelemetryView>,
    pub(crate) settings: ConsoleSettings,
    pub(crate) spinner: usize,
    pub(crate) last_tick: Instant,
    pub(crate) tick_rate: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

/// The notice shown in the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusLine {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Info,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Error,
        }
    }
}

/// Temporary panels drawn on top of the main interface.
#[derive(Debug, Clone)]
pub enum OverlayState {
    InputPrompt(InputPromptState),
}

/// Actions that need a line of user input first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInputAction {
    OpenConversation,
    NewConversation,
}

/// State for the input prompt overlay.
#[derive(Debug, Clone)]
pub struct InputPromptState {
    pub title: String,
    pub value: String,
    /// Placeholder text to display when the input is empty.
    pub placeholder: String,
    pub action: PendingInputAction,
    pub error: Option<String>,
}

impl InputPromptState {
    pub fn new(
        title: impl Into<String>,
        placeholder: impl Into<String>,
        action: PendingInputAction,
        initial: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            value: initial.unwrap_or_default(),
            placeholder: placeholder.into(),
            action,
            error: None,
        }
    }
}
