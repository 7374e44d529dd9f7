pub mod key;
pub mod timeline;

pub use key::ConversationKey;
pub use timeline::{AppendOutcome, DeliveryState, Timeline, TimelineEntry};
