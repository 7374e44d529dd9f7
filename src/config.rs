use dotenvy::dotenv;
use std::env;

/// Endpoints for the two collaborators a chat session talks to: the profile
/// directory (HTTP, also serves history) and the chat socket (WebSocket).
///
/// The session constructs its own channel from this config; nothing here is
/// global or shared between sessions.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub directory_base_url: String,
    pub chat_socket_url: String,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, crate::error::ChatError> {
        dotenv().ok();
        let directory_base_url =
            env::var("ATLAS_API_BASE_URL").unwrap_or_else(|_| "http://localhost:5002".into());
        let chat_socket_url = match env::var("ATLAS_WS_URL") {
            Ok(url) => url,
            Err(_) => Self::derive_socket_url(&directory_base_url)?,
        };
        Ok(Self {
            directory_base_url,
            chat_socket_url,
        })
    }

    /// Explicit endpoints, no environment. Tests point this at in-process
    /// mock collaborators.
    pub fn for_urls(directory_base_url: impl Into<String>, chat_socket_url: impl Into<String>) -> Self {
        Self {
            directory_base_url: directory_base_url.into(),
            chat_socket_url: chat_socket_url.into(),
        }
    }

    // The chat socket lives on the same host as the directory API unless
    // configured otherwise.
    fn derive_socket_url(base: &str) -> Result<String, crate::error::ChatError> {
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(crate::error::ChatError::Config(format!(
                "ATLAS_API_BASE_URL must start with http:// or https://, got {base}"
            )));
        };
        Ok(format!("{}/ws", ws_base.trim_end_matches('/')))
    }
}
