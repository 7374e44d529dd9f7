//! HTTP client for the profile directory collaborator.
//!
//! The directory is an external, loosely-typed store; this client only
//! shapes requests and decodes rows. Matching rules (exact identity
//! equality etc.) live in the identity resolver.

use crate::error::{ChatError, ChatResult};
use crate::models::{NewProfile, Participant};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Build from an existing client (preferred when several collaborator
    /// clients share one transport).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Free-text search over the directory. An empty query returns the
    /// whole directory; an empty result list is a valid answer.
    pub async fn search(&self, q: &str) -> ChatResult<Vec<Participant>> {
        let response = self
            .http
            .get(format!("{}/api/search", self.base_url))
            .query(&[("q", q)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Lightweight registration gate: does any profile carry this email?
    pub async fn exists(&self, email: &str) -> ChatResult<bool> {
        let response = self
            .http
            .get(format!("{}/api/check_profile_exists", self.base_url))
            .query(&[("email", email)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: ExistsResponse = response.json().await?;
        Ok(body.exists)
    }

    pub async fn organizations(&self) -> ChatResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/organizations", self.base_url))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Profiles within `radius_km` of a point, sorted by distance,
    /// optionally restricted to one organization.
    pub async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        organization: Option<&str>,
    ) -> ChatResult<Vec<Participant>> {
        let mut query = vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("radius", radius_km.to_string()),
        ];
        if let Some(org) = organization {
            query.push(("organization", org.to_string()));
        }
        let response = self
            .http
            .get(format!("{}/api/nearby", self.base_url))
            .query(&query)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Register a new profile. The directory assigns the row id.
    pub async fn submit(&self, profile: &NewProfile) -> ChatResult<()> {
        let response = self
            .http
            .post(format!("{}/api/submit", self.base_url))
            .json(profile)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // Surface the directory's {"error": ...} body when it sent one.
    async fn check(response: reqwest::Response) -> ChatResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(ChatError::Directory(detail))
    }
}
