use std::fmt;

/// Identifies one send. Updates carrying another run's id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub(crate) u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// State of the reply currently streaming into a conversation.
///
/// Exists exactly while a run is in flight; the controller drops it when the
/// run finalizes. The frame decoder buffer belongs to the pump task reading
/// the response body.
#[derive(Debug)]
pub struct StreamSession {
    run: RunId,
    conversation_id: String,
    draft: String,
    tokens: usize,
    agent_ended: bool,
}

impl StreamSession {
    pub fn new(run: RunId, conversation_id: impl Into<String>) -> Self {
        Self {
            run,
            conversation_id: conversation_id.into(),
            draft: String::new(),
            tokens: 0,
            agent_ended: false,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn agent_ended(&self) -> bool {
        self.agent_ended
    }

    /// Appends one delta and returns the whole draft so far.
    pub fn append(&mut self, delta: &str) -> &str {
        self.draft.push_str(delta);
        self.tokens += 1;
        &self.draft
    }

    pub(crate) fn mark_agent_ended(&mut self) {
        self.agent_ended = true;
    }
}
