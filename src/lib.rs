pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod session;
pub mod websocket;

pub use config::ChatConfig;
pub use conversation::{ConversationKey, DeliveryState, Timeline, TimelineEntry};
pub use error::{ChatError, ChatResult};
pub use models::{ChatMessage, NewProfile, Participant, ParticipantId};
pub use services::{DirectoryClient, HistoryClient, IdentityResolver};
pub use session::{CloseReason, ConversationSession, SessionHandle, SessionStatus};
pub use websocket::{ChannelEvent, RealtimeChannel};
