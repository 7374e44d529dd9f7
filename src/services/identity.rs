use crate::error::ChatResult;
use crate::models::{Participant, ParticipantId};
use crate::services::directory_client::DirectoryClient;

/// Resolves external identities (the authenticated caller's email, a peer's
/// row id) to directory records.
///
/// The directory's own search is fuzzy, so the exact-match rule is applied
/// here, client-side: identity equality is case-insensitive and
/// whitespace-trimmed. `Ok(None)` means no record — for the caller's own
/// identity that is "complete registration first", not a retryable fault.
pub struct IdentityResolver {
    directory: DirectoryClient,
}

impl IdentityResolver {
    pub fn new(directory: DirectoryClient) -> Self {
        Self { directory }
    }

    pub async fn resolve_self(&self, email: &str) -> ChatResult<Option<Participant>> {
        let wanted = email.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        let candidates = self.directory.search(email.trim()).await?;
        Ok(candidates.into_iter().find(|p| {
            p.email
                .as_deref()
                .is_some_and(|e| e.trim().to_lowercase() == wanted)
        }))
    }

    pub async fn resolve_peer(&self, id: &ParticipantId) -> ChatResult<Option<Participant>> {
        // Row ids are not searchable text; filter the broad listing.
        let everyone = self.directory.search("").await?;
        Ok(everyone.into_iter().find(|p| p.id == *id))
    }
}
