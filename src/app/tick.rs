use std::time::Instant;

use super::App;

impl App {
    /// Called on every tick of the event loop. Animates the streaming indicator.
    pub(crate) fn on_tick(&mut self) {
        if self.last_tick.elapsed() < self.tick_rate {
            return;
        }
        self.last_tick = Instant::now();
        if self.session.is_streaming() {
            self.spinner = self.spinner.wrapping_add(1);
        } else {
            self.spinner = 0;
        }
    }
}
