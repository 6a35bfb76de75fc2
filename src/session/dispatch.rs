use log::debug;

use super::messages::MessageLog;
use super::stream::StreamSession;
use crate::protocol::RunEvent;

/// What applying one run event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEffect {
    /// The draft grew and the assistant placeholder shows it.
    DraftUpdated,
    /// The draft grew but the tail message is not an assistant message.
    DraftOrphaned,
    /// The agent finished; history and telemetry must be reloaded.
    ReloadRequested,
    Ignored,
}

/// Applies `event` to the stream session and the message sequence.
pub fn apply_event(
    session: &mut StreamSession,
    messages: &mut MessageLog,
    event: &RunEvent,
) -> DispatchEffect {
    match event {
        RunEvent::Token { delta } => {
            let draft = session.append(delta);
            if messages.overwrite_draft(draft) {
                DispatchEffect::DraftUpdated
            } else {
                debug!(
                    "{}: token arrived without an assistant placeholder at the tail",
                    session.run()
                );
                DispatchEffect::DraftOrphaned
            }
        }
        RunEvent::AgentEnd => {
            session.mark_agent_ended();
            DispatchEffect::ReloadRequested
        }
        RunEvent::Other { name } => {
            debug!("{}: ignoring `{}` event", session.run(), name);
            DispatchEffect::Ignored
        }
    }
}
