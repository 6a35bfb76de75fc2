use crossterm::event::KeyEvent;

use crate::session::StreamUpdate;

/// Application events.
#[derive(Debug)]
pub enum Event {
    /// A tick event, sent at a regular interval.
    Tick,
    /// A key press event.
    Key(KeyEvent),
    /// The terminal was resized; the next draw picks up the new size.
    Resize,
    /// An update from the run currently streaming.
    Stream(StreamUpdate),
    /// The telemetry view published a new snapshot.
    TelemetryChanged,
}
