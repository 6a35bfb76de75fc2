use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::{App, PendingInputAction};

const SCROLL_STEP: u16 = 5;

impl App {
    /// The main entry point for handling keyboard events.
    ///
    /// Overlays capture input first, then global shortcuts, then the composer.
    pub async fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.overlay.is_some() {
            self.handle_overlay_key(key).await;
            return;
        }

        if self.handle_global_shortcuts(key).await {
            return;
        }

        self.handle_composer_key(key);
    }

    /// Returns `true` if a shortcut was handled.
    async fn handle_global_shortcuts(&mut self, key: KeyEvent) -> bool {
        if !key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::PageUp => {
                    self.chat_scroll = self.chat_scroll.saturating_add(SCROLL_STEP);
                    true
                }
                KeyCode::PageDown => {
                    self.chat_scroll = self.chat_scroll.saturating_sub(SCROLL_STEP);
                    true
                }
                _ => false,
            };
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            // Ctrl+Shift+N asks for a title first.
            KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::SHIFT) => {
                self.prompt_input(PendingInputAction::NewConversation)
            }
            KeyCode::Char('N') => self.prompt_input(PendingInputAction::NewConversation),
            KeyCode::Char('n') => self.new_conversation(None).await,
            KeyCode::Char('o') => self.prompt_input(PendingInputAction::OpenConversation),
            KeyCode::Char('r') => self.refresh_all().await,
            KeyCode::Char('l') => self.reload_history().await,
            KeyCode::Char('t') => self.refresh_telemetry().await,
            KeyCode::Char('a') => self.toggle_auto_refresh(),
            KeyCode::Char('p') => self.toggle_payloads(),
            _ => return false,
        }
        true
    }

    fn handle_composer_key(&mut self, key: KeyEvent) {
        if self.session.is_streaming() {
            if matches!(key.code, KeyCode::Char(_) | KeyCode::Enter | KeyCode::Backspace) {
                self.notice("Input is disabled while the reply streams");
            }
            return;
        }

        match key.code {
            KeyCode::Enter => self.submit_message(),
            KeyCode::Backspace => self.composer.backspace(),
            KeyCode::Delete => self.composer.delete(),
            KeyCode::Left => self.composer.move_left(),
            KeyCode::Right => self.composer.move_right(),
            KeyCode::Home => self.composer.move_home(),
            KeyCode::End => self.composer.move_end(),
            KeyCode::Up => {
                self.composer.history_previous();
            }
            KeyCode::Down => {
                self.composer.history_next();
            }
            KeyCode::Esc => self.composer.clear(),
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::ALT) => {
                self.composer.insert_char(ch)
            }
            _ => {}
        }
    }
}
