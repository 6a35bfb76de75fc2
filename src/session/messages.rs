use chrono::{SecondsFormat, Utc};

use crate::store::{LOCAL_ID_PREFIX, Message, Role};

/// Ids of the placeholder pair appended by [`MessageLog::push_optimistic_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticTurn {
    pub user_id: String,
    pub assistant_id: String,
}

/// The message sequence of the selected conversation.
///
/// Holds authoritative messages from the store, followed by at most one pair of
/// local placeholders per send. A reload replaces everything at once; local
/// ids are never matched against store ids.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    local_seq: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn local_count(&self) -> usize {
        self.messages.iter().filter(|message| message.is_local()).count()
    }

    /// Appends the submitted user text and an empty assistant draft.
    pub fn push_optimistic_turn(&mut self, conversation_id: &str, text: &str) -> OptimisticTurn {
        let now = Utc::now();
        let created_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let stamp = now.timestamp_millis();

        let user_id = self.next_local_id(&Role::User, stamp);
        let assistant_id = self.next_local_id(&Role::Assistant, stamp);
        self.messages.push(Message {
            id: user_id.clone(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            content: text.to_string(),
            created_at: created_at.clone(),
        });
        self.messages.push(Message {
            id: assistant_id.clone(),
            conversation_id: conversation_id.to_string(),
            role: Role::Assistant,
            content: String::new(),
            created_at,
        });
        OptimisticTurn {
            user_id,
            assistant_id,
        }
    }

    /// Overwrites the tail message with `text` if it is an assistant message.
    /// Returns false, leaving the log untouched, otherwise.
    pub fn overwrite_draft(&mut self, text: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.clear();
                last.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Replaces the whole sequence with the store's messages.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    // The sequence number keeps ids unique when two sends share a millisecond.
    fn next_local_id(&mut self, role: &Role, stamp: i64) -> String {
        self.local_seq += 1;
        format!(
            "{LOCAL_ID_PREFIX}{}-{stamp}-{}",
            role.label(),
            self.local_seq
        )
    }
}
