use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{App, InputPromptState, OverlayState, PendingInputAction};

impl App {
    pub(crate) fn close_overlay(&mut self) {
        self.overlay = None;
    }

    /// Handles key events while an overlay is open. Overlays capture all input.
    pub(crate) async fn handle_overlay_key(&mut self, key: KeyEvent) {
        // Take the state out so the handlers can borrow `self` freely.
        if let Some(overlay) = self.overlay.take() {
            match overlay {
                OverlayState::InputPrompt(state) => self.handle_input_prompt_key(key, state).await,
            }
        }
    }

    async fn handle_input_prompt_key(&mut self, key: KeyEvent, mut state: InputPromptState) {
        match key.code {
            KeyCode::Esc => {
                self.notice("Cancelled");
                return;
            }
            KeyCode::Enter => {
                if let Err(message) = self.confirm_prompt(&state).await {
                    state.error = Some(message);
                    self.overlay = Some(OverlayState::InputPrompt(state));
                }
                return;
            }
            KeyCode::Backspace => {
                state.value.pop();
                state.error = None;
            }
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                state.value.push(ch);
                state.error = None;
            }
            _ => {}
        }
        self.overlay = Some(OverlayState::InputPrompt(state));
    }

    /// Runs the prompt's action. An `Err` keeps the prompt open with the message.
    async fn confirm_prompt(&mut self, state: &InputPromptState) -> Result<(), String> {
        let value = state.value.trim();
        match state.action {
            PendingInputAction::OpenConversation => {
                if value.is_empty() {
                    return Err(String::from("Enter a conversation id"));
                }
                self.open_conversation(value)
                    .await
                    .map_err(|err| err.to_string())
            }
            PendingInputAction::NewConversation => {
                self.new_conversation(Some(value.to_string())).await;
                Ok(())
            }
        }
    }
}
