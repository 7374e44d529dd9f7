use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory rejected the request: {0}")]
    Directory(String),

    #[error("your profile is not registered in the directory")]
    NotRegistered,

    #[error("peer profile not found")]
    PeerNotFound,

    #[error("history fetch failed: {0}")]
    History(String),

    #[error("realtime channel error: {0}")]
    Channel(String),

    #[error("message body is empty")]
    EmptyMessage,

    #[error("channel is not connected")]
    NotConnected,

    #[error("session is closed")]
    SessionClosed,
}

impl ChatError {
    /// Terminal errors end the session; everything else degrades it
    /// (read-only chat) or is rejected at the call site.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatError::NotRegistered
                | ChatError::PeerNotFound
                | ChatError::History(_)
                | ChatError::SessionClosed
        )
    }
}
