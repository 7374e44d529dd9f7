use crate::conversation::ConversationKey;
use crate::error::{ChatError, ChatResult};
use crate::models::ChatMessage;

/// Read client for the message history store.
///
/// One read per session start, no retry or backoff: failure surfaces to the
/// session, which closes with a visible error. An empty list is a fresh
/// conversation, not a failure.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Ordered past messages for one conversation. The query uses the
    /// key's canonical pair, so both participants issue the identical
    /// request and hit the same stored conversation.
    pub async fn fetch_history(&self, key: &ConversationKey) -> ChatResult<Vec<ChatMessage>> {
        let (user1, user2) = key.as_pair();
        let response = self
            .http
            .get(format!("{}/api/chat_history", self.base_url))
            .query(&[("user1", user1.as_str()), ("user2", user2.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::History(format!(
                "history store returned {status} for {key}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ChatError::History(format!("decode history for {key}: {e}")))
    }
}
