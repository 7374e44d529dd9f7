use crate::models::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical, order-independent identifier for a two-party conversation.
///
/// The two ids are stored sorted, so `ConversationKey::new(a, b)` and
/// `ConversationKey::new(b, a)` are the same value and both participants
/// derive the same key without negotiation. The structured pair feeds
/// history queries; `room_name()` is the joined form for logging. The
/// joined form is never sent to the chat server — room identity is
/// computed server-side from the two raw ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    first: ParticipantId,
    second: ParticipantId,
}

impl ConversationKey {
    pub fn new(a: ParticipantId, b: ParticipantId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn as_pair(&self) -> (&ParticipantId, &ParticipantId) {
        (&self.first, &self.second)
    }

    pub fn room_name(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }

    /// Unordered membership test against the key's pair.
    pub fn matches(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        (self.first == *a && self.second == *b) || (self.first == *b && self.second == *a)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.second)
    }
}
