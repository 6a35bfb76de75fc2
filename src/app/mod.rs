//! 終端機前端：應用程式狀態與按鍵處理，
//! 以及事件迴圈和 [`SessionController`](crate::session::SessionController) 之間的銜接。

mod actions;
mod composer;
mod init;
mod keyboard;
mod overlays;
mod session;
mod state;
mod tick;

pub use composer::Composer;
pub use state::{
    App, InputPromptState, OverlayState, PendingInputAction, StatusKind, StatusLine,
};

use crate::event::Event;

impl App {
    /// 分派主迴圈送來的一個事件。
    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Tick => self.on_tick(),
            Event::Key(key) => self.handle_key(key).await,
            Event::Resize => {}
            Event::Stream(update) => self.apply_stream_update(update),
            Event::TelemetryChanged => self.sync_telemetry(),
        }
    }

    /// 等待串流回覆或遙測輪詢的下一個更新。
    pub async fn next_background_event(&mut self) -> Event {
        tokio::select! {
            Some(update) = self.session.next_update() => Event::Stream(update),
            Ok(()) = self.telemetry_rx.changed() => Event::TelemetryChanged,
            else => std::future::pending().await,
        }
    }
}
