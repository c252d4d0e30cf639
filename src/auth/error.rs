//! Error taxonomy for the authentication flow
//!
//! - `ProviderError`: any failed call to the identity provider. Always recoverable
//!   at the request level (converted to a redirect or to "no session").
//! - `AuthError`: what the gateway and callback surface to their callers. A missing
//!   provider configuration is fatal for them and is reported explicitly.
//!
//! Errors reported by the provider through callback query parameters never become
//! an `AuthError`; the callback handler turns them into an error-page redirect.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Network-level failure (DNS, connection refused, TLS)
    #[error("provider request failed: {0}")]
    Request(String),

    /// The call did not complete within the configured bound
    #[error("provider call timed out")]
    Timeout,

    /// The provider answered with a non-success status
    #[error("provider rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The provider answered 2xx but the body could not be decoded
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("no redirect url")]
    MissingRedirectUrl,

    /// The PKCE verifier cookie did not survive the round trip, so the
    /// provider would refuse the exchange
    #[error("code verifier cookie missing")]
    MissingCodeVerifier,
}

impl ProviderError {
    /// True when the provider says the presented credential is no longer valid
    /// (expired, revoked, or an already-rotated refresh token).
    ///
    /// Transport failures and provider outages return false: the stored session may
    /// still be good and must not be discarded.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, ProviderError::Rejected { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Identity provider URL or key is absent
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AuthError {
    pub fn missing_provider() -> Self {
        AuthError::Configuration(
            "AUTH_PROVIDER_URL and AUTH_PROVIDER_KEY must both be set".to_string(),
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Configuration(msg) => {
                tracing::error!(error = %msg, "Authentication is not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Authentication is not configured",
                        "message": msg,
                        "code": "CONFIGURATION_ERROR"
                    })),
                )
                    .into_response()
            }
            AuthError::Provider(e) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Identity provider error",
                    "message": e.to_string(),
                    "code": "PROVIDER_ERROR"
                })),
            )
                .into_response(),
        }
    }
}
