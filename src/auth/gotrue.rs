//! HTTP client for a GoTrue-compatible auth server
//!
//! Endpoints used:
//! - `GET  /auth/v1/authorize` (URL only, visited by the browser)
//! - `POST /auth/v1/token?grant_type=pkce`
//! - `POST /auth/v1/token?grant_type=refresh_token`
//! - `GET  /auth/v1/user`

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;

use super::error::ProviderError;
use super::provider::{AuthorizationResponse, Identity, IdentityProvider, OAuthProvider, Session};
use crate::config::ProviderConfig;

/// Create a reqwest client for provider requests using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

/// Error body shapes returned by GoTrue (old and new formats)
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_error(self, status: u16) -> ProviderError {
        let message = self
            .error_description
            .or(self.msg)
            .or(self.message)
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("HTTP {}", status));
        ProviderError::Rejected {
            status,
            code: self.error_code.or(self.error),
            message,
        }
    }
}

pub struct GoTrueClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GoTrueClient {
    pub fn new(
        config: &ProviderConfig,
        connect_timeout_secs: u64,
        request_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = create_http_client(connect_timeout_secs, request_timeout_secs)?;

        tracing::info!(
            provider_url = %config.url,
            "Identity provider client initialized"
        );

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.public_key.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("/token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;

        decode_response(response).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    Err(body.into_error(status.as_u16()))
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn begin_authorization(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<AuthorizationResponse, ProviderError> {
        let mut url = url::Url::parse(&self.endpoint("/authorize"))
            .map_err(|e| ProviderError::Request(format!("invalid authorize url: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");

        Ok(AuthorizationResponse {
            url: Some(url.to_string()),
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<Session, ProviderError> {
        self.token_request(
            "pkce",
            serde_json::json!({
                "auth_code": code,
                "code_verifier": code_verifier,
            }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.token_request(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, ProviderError> {
        let response = self
            .client
            .get(self.endpoint("/user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        decode_response(response).await
    }
}
