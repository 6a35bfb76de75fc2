use log::info;

use super::{App, InputPromptState, OverlayState, PendingInputAction};
use crate::error::ConsoleError;

impl App {
    /// Creates a conversation and makes it current.
    pub(crate) async fn new_conversation(&mut self, title: Option<String>) {
        let title = title.unwrap_or_else(|| self.settings.conversation_title.clone());
        let created = self
            .session
            .create_conversation(&title)
            .await
            .map(|conversation| conversation.id.clone());
        match created {
            Ok(id) => {
                self.chat_scroll = 0;
                self.notice(format!("New conversation {id}"));
            }
            Err(err) => self.report_error(err),
        }
        self.sync_telemetry();
    }

    /// Opens an existing conversation by id.
    pub(crate) async fn open_conversation(&mut self, id: &str) -> Result<(), ConsoleError> {
        self.session.open_conversation(id).await?;
        self.chat_scroll = 0;
        self.sync_telemetry();
        let count = self.session.messages().len();
        self.notice(format!("Opened {} · {count} messages", id.trim()));
        Ok(())
    }

    /// Opens the conversation named on the command line, reporting failures in the status bar.
    pub async fn open_at_startup(&mut self, id: &str) {
        if let Err(err) = self.open_conversation(id).await {
            self.report_error(err);
        }
    }

    pub(crate) async fn reload_history(&mut self) {
        match self.session.reload_history().await {
            Ok(()) => {
                let count = self.session.messages().len();
                self.notice(format!("History reloaded · {count} messages"));
            }
            Err(err) => self.report_error(err),
        }
    }

    /// Reloads history and waits for a fresh telemetry snapshot.
    pub(crate) async fn refresh_all(&mut self) {
        match self.session.refresh().await {
            Ok(()) => {
                self.sync_telemetry();
                self.notice("History and telemetry refreshed");
            }
            Err(err) => self.report_error(err),
        }
    }

    pub(crate) async fn refresh_telemetry(&mut self) {
        match self.session.refresh_telemetry().await {
            Ok(()) => {
                self.sync_telemetry();
                self.notice("Telemetry refreshed");
            }
            Err(err) => self.report_error(err),
        }
    }

    pub(crate) fn toggle_auto_refresh(&mut self) {
        let enabled = !self.session.telemetry().auto_refresh();
        self.session.telemetry_mut().set_auto_refresh(enabled);
        self.notice(if enabled {
            "Telemetry auto refresh on"
        } else {
            "Telemetry auto refresh off"
        });
    }

    pub(crate) fn toggle_payloads(&mut self) {
        self.show_payloads = !self.show_payloads;
    }

    /// Sends the composer content. The buffer is only consumed once the run started.
    pub(crate) fn submit_message(&mut self) {
        match self.session.send(self.composer.buffer()) {
            Ok(run) => {
                let text = self.composer.take();
                self.chat_scroll = 0;
                info!("{}: submitted {:?}", run, text);
                self.notice("Streaming reply…");
            }
            Err(err) => self.report_error(err),
        }
    }

    pub(crate) fn prompt_input(&mut self, action: PendingInputAction) {
        let state = match action {
            PendingInputAction::OpenConversation => InputPromptState::new(
                "Open conversation",
                "Conversation id",
                action,
                self.session.conversation_id().map(str::to_string),
            ),
            PendingInputAction::NewConversation => InputPromptState::new(
                "New conversation",
                "Title (empty for none)",
                action,
                Some(self.settings.conversation_title.clone()),
            ),
        };
        self.overlay = Some(OverlayState::InputPrompt(state));
    }
}
