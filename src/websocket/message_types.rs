use crate::models::{ChatMessage, ParticipantId};
use serde::{Deserialize, Serialize};

/// Outbound events from client to chat server.
///
/// `join_room` carries the two raw participant ids — the server computes
/// the canonical room from them; the client never transmits a precomputed
/// room name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join_room")]
    JoinRoom {
        user1: ParticipantId,
        user2: ParticipantId,
    },
    #[serde(rename = "send_message")]
    SendMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
}

/// Inbound events pushed by the chat server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "joined_room")]
    JoinedRoom { room: String },
    #[serde(rename = "receive_message")]
    ReceiveMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
