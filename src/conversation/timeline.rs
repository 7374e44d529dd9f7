use crate::conversation::key::ConversationKey;
use crate::models::ChatMessage;

/// Delivery state of a timeline entry.
///
/// `Pending` marks the sender's optimistic local copy, waiting for the
/// server echo. History rows and peer messages enter as `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Delivered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub message: ChatMessage,
    pub delivery: DeliveryState,
}

/// What `append_live` did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New message appended at the tail.
    Appended,
    /// Echo of an optimistic entry; confirmed in place, nothing appended.
    Confirmed,
    /// Redelivery of a message already delivered; dropped.
    Duplicate,
    /// Message does not belong to this conversation; dropped.
    NotParticipant,
}

/// Ordered, session-local message sequence for one conversation.
///
/// Append-only. History order is preserved as the server returned it; live
/// messages are appended in receipt order. No re-sort happens across the
/// history/live boundary, so a historical record arriving after connect
/// would sit out of order — accepted limitation.
///
/// Invariant: every entry's {sender, receiver} unordered pair equals the
/// key's pair. Enforced on every append.
#[derive(Debug, Clone)]
pub struct Timeline {
    key: ConversationKey,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            entries: Vec::new(),
        }
    }

    /// Seed from a history fetch. Rows for other pairs are dropped rather
    /// than trusted; the store is external and loosely typed.
    pub fn from_history(key: ConversationKey, history: Vec<ChatMessage>) -> Self {
        let mut timeline = Self::new(key);
        for message in history {
            let (a, b) = timeline.key.as_pair();
            if !message.involves(a, b) {
                tracing::warn!(
                    conversation = %timeline.key,
                    sender = %message.sender_id,
                    receiver = %message.receiver_id,
                    "dropping history row for a different pair"
                );
                continue;
            }
            timeline.entries.push(TimelineEntry {
                message,
                delivery: DeliveryState::Delivered,
            });
        }
        timeline
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the sender's optimistic local copy.
    pub fn append_pending(&mut self, message: ChatMessage) {
        debug_assert!({
            let (a, b) = self.key.as_pair();
            message.involves(a, b)
        });
        self.entries.push(TimelineEntry {
            message,
            delivery: DeliveryState::Pending,
        });
    }

    /// Merge one live push into the timeline.
    ///
    /// An echo of a pending entry confirms it in place; a redelivery of an
    /// already-delivered tagged message is dropped; anything else for this
    /// pair is appended in receipt order.
    pub fn append_live(&mut self, message: ChatMessage) -> AppendOutcome {
        let (a, b) = self.key.as_pair();
        if !message.involves(a, b) {
            return AppendOutcome::NotParticipant;
        }

        match self.find_echo_target(&message) {
            Some(i) => {
                let entry = &mut self.entries[i];
                match entry.delivery {
                    DeliveryState::Pending => {
                        entry.delivery = DeliveryState::Delivered;
                        AppendOutcome::Confirmed
                    }
                    DeliveryState::Delivered => AppendOutcome::Duplicate,
                }
            }
            None => {
                self.entries.push(TimelineEntry {
                    message,
                    delivery: DeliveryState::Delivered,
                });
                AppendOutcome::Appended
            }
        }
    }

    // Locate the local entry this inbound message is an echo/redelivery of.
    // Tag match is authoritative; the tuple fallback covers servers that
    // strip unknown fields, and only ever confirms pending entries so a
    // peer legitimately repeating the same text is not swallowed.
    fn find_echo_target(&self, incoming: &ChatMessage) -> Option<usize> {
        if let Some(tag) = incoming.client_tag {
            return self
                .entries
                .iter()
                .position(|e| e.message.client_tag == Some(tag));
        }
        self.entries.iter().position(|e| {
            e.delivery == DeliveryState::Pending
                && e.message.sender_id == incoming.sender_id
                && e.message.receiver_id == incoming.receiver_id
                && e.message.timestamp == incoming.timestamp
                && e.message.message == incoming.message
        })
    }
}
