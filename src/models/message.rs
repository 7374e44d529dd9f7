use crate::models::participant::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chat message as it travels over the wire and sits in a timeline.
///
/// There is no server-assigned message id; `client_tag` is the sender-local
/// identity used to reconcile the optimistic local copy with the server
/// echo and to drop redelivered events. History rows and servers that strip
/// unknown fields leave it `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<Uuid>,
}

impl ChatMessage {
    /// Unordered membership test: does this message belong to the
    /// conversation between `a` and `b`, regardless of direction?
    pub fn involves(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        (self.sender_id == *a && self.receiver_id == *b)
            || (self.sender_id == *b && self.receiver_id == *a)
    }
}
