//! Conversation session: message sequence, run streaming and telemetry.

pub mod controller;
pub mod dispatch;
pub mod messages;
pub mod pump;
pub mod stream;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Applied, SessionController, SessionPhase};
pub use pump::{RunOutcome, StreamUpdate};
pub use stream::{RunId, StreamSession};
pub use telemetry::{TelemetryHandle, TelemetryPoller, TelemetryView};
