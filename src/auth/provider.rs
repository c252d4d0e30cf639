//! Identity provider abstraction
//!
//! The provider owns sessions; this service only transports them. The trait is the
//! seam between the request-scoped `SessionClient` and the concrete HTTP client
//! (`GoTrueClient`), and lets tests substitute an in-memory provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ProviderError;

/// External OAuth providers the login page offers. Only Google is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

/// Authenticated identity as reported by the provider's identity-read endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl Identity {
    /// Name to show in the UI
    pub fn display_name(&self) -> &str {
        self.user_metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Provider-issued token pair plus its validity window
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp (seconds) after which the access token is invalid
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<Identity>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

// Tokens must never reach the logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user.as_ref().map(|u| u.id.as_str()))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the provider only sent the relative value
    pub fn stamped(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now.saturating_add(secs));
        }
        self
    }

    /// Whether the access token is expired or will expire within `margin_secs`.
    /// A session without any expiry information is used as-is.
    pub fn needs_refresh(&self, now: i64, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at.saturating_sub(margin_secs) <= now,
            None => false,
        }
    }
}

/// Result of asking the provider to begin an authorization round trip
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResponse {
    pub url: Option<String>,
}

/// Operations consumed from the identity provider.
///
/// All methods perform (at most) one outbound call and hold no per-request state.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build/request the URL the browser must visit to authenticate
    async fn begin_authorization(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<AuthorizationResponse, ProviderError>;

    /// Exchange a one-time authorization code for a session
    async fn exchange_code(&self, code: &str, code_verifier: &str)
        -> Result<Session, ProviderError>;

    /// Trade a refresh token for a new session (the refresh token may rotate)
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError>;

    /// Validate an access token against the provider and return its identity
    async fn get_user(&self, access_token: &str) -> Result<Identity, ProviderError>;
}
