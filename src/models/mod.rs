pub mod message;
pub mod participant;

pub use message::ChatMessage;
pub use participant::{NewProfile, Participant, ParticipantId};
