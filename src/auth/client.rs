//! Request-scoped session client
//!
//! A `SessionClient` is created for one request from the inbound cookies. Every
//! cookie mutation it performs is recorded twice: in its working jar (so later reads
//! in the same request see the new state) and in an ordered list of pending writes
//! that the caller applies to the response once, when the response is finalized.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use oauth2::PkceCodeChallenge;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::cookies::{
    apply_to_jar, chunked_writes, decode_session, encode_session, read_chunked, removal_writes,
    CookieSettings,
};
use super::error::{AuthError, ProviderError};
use super::provider::{Identity, IdentityProvider, OAuthProvider, Session};
use crate::AppState;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Short, non-reversible token fingerprint for log correlation
pub(crate) fn token_fingerprint(token: &str) -> String {
    let digest = format!("{:x}", md5::compute(token));
    digest[..12].to_string()
}

pub struct SessionClient {
    provider: Arc<dyn IdentityProvider>,
    settings: CookieSettings,
    jar: CookieJar,
    writes: Vec<Cookie<'static>>,
    call_timeout: Duration,
    refresh_margin_secs: i64,
}

impl SessionClient {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        settings: CookieSettings,
        headers: &HeaderMap,
        call_timeout: Duration,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            provider,
            settings,
            jar: CookieJar::from_headers(headers),
            writes: Vec::new(),
            call_timeout,
            refresh_margin_secs,
        }
    }

    /// Build a client from application state, failing closed when the
    /// identity provider is not configured.
    pub fn from_state(state: &AppState, headers: &HeaderMap) -> Result<Self, AuthError> {
        let provider = state.provider.clone().ok_or_else(AuthError::missing_provider)?;
        let settings =
            CookieSettings::from_config(&state.config).ok_or_else(AuthError::missing_provider)?;

        Ok(Self::new(
            provider,
            settings,
            headers,
            state.config.provider_call_timeout(),
            state.config.session_refresh_margin_secs,
        ))
    }

    /// Await a provider call with the configured bound; elapsed means `Timeout`
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation = operation,
                    timeout_secs = self.call_timeout.as_secs(),
                    "Identity provider call timed out"
                );
                Err(ProviderError::Timeout)
            }
        }
    }

    fn push_write(&mut self, cookie: Cookie<'static>) {
        // Last write for a name wins
        self.writes.retain(|c| c.name() != cookie.name());
        self.jar = apply_to_jar(self.jar.clone(), &cookie);
        self.writes.push(cookie);
    }

    fn load_session(&self) -> Option<Session> {
        let raw = read_chunked(&self.jar, &self.settings.storage_key)?;
        let session = decode_session(&raw);
        if session.is_none() {
            tracing::warn!("Stored session cookie could not be decoded; ignoring it");
        }
        session
    }

    fn store_session(&mut self, session: &Session) {
        let value = match encode_session(session) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode session for cookie storage");
                return;
            }
        };
        let key = self.settings.storage_key.clone();
        for cookie in chunked_writes(&self.jar, &self.settings, &key, &value) {
            self.push_write(cookie);
        }
    }

    fn clear_session(&mut self) {
        let key = self.settings.storage_key.clone();
        for cookie in removal_writes(&self.jar, &self.settings, &key) {
            self.push_write(cookie);
        }
    }

    /// Session-read. Refreshes the token pair when the access token is expired
    /// or about to expire.
    ///
    /// A refresh the provider rejects (expired, revoked, already rotated by a
    /// concurrent request) removes the stored session. A refresh that fails in
    /// transit leaves the cookies alone so a later request can retry.
    pub async fn get_session(&mut self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.load_session() else {
            return Ok(None);
        };

        let now = unix_now();
        if !session.needs_refresh(now, self.refresh_margin_secs) {
            return Ok(Some(session));
        }

        tracing::debug!(
            expires_at = ?session.expires_at,
            now = now,
            "Session expired or expiring; refreshing"
        );

        let provider = Arc::clone(&self.provider);
        let refreshed = self
            .bounded("refresh_session", provider.refresh_session(&session.refresh_token))
            .await;

        match refreshed {
            Ok(new_session) => {
                let new_session = new_session.stamped(unix_now());
                self.store_session(&new_session);
                tracing::info!(
                    event = "session_refreshed",
                    expires_at = ?new_session.expires_at,
                    "Session refreshed"
                );
                Ok(Some(new_session))
            }
            Err(e) => {
                if e.is_credential_rejected() {
                    tracing::info!(
                        event = "session_refresh_rejected",
                        error = %e,
                        refresh_token = %token_fingerprint(&session.refresh_token),
                        "Refresh token rejected; clearing stored session"
                    );
                    self.clear_session();
                } else {
                    tracing::warn!(
                        event = "session_refresh_failed",
                        error = %e,
                        "Session refresh failed; keeping stored session"
                    );
                }
                Err(e)
            }
        }
    }

    /// Identity-read. Validates the (possibly just refreshed) access token with
    /// the provider instead of trusting the stored session.
    pub async fn get_user(&mut self) -> Result<Option<Identity>, ProviderError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        self.validate(&session).await.map(Some)
    }

    /// Identity-read that never refreshes. Validates the stored access token
    /// as-is; an expired one counts as no session.
    ///
    /// For callers whose cookie writes never reach the response: a refresh there
    /// would rotate the refresh token without the browser ever learning the new one.
    pub async fn get_user_without_refresh(&self) -> Result<Option<Identity>, ProviderError> {
        let Some(session) = self.load_session() else {
            return Ok(None);
        };

        if session.needs_refresh(unix_now(), 0) {
            tracing::debug!(
                expires_at = ?session.expires_at,
                "Stored access token expired; not refreshing outside the synchronizer"
            );
            return Ok(None);
        }

        self.validate(&session).await.map(Some)
    }

    async fn validate(&self, session: &Session) -> Result<Identity, ProviderError> {
        let provider = Arc::clone(&self.provider);
        self.bounded("get_user", provider.get_user(&session.access_token))
            .await
    }

    /// Start the OAuth round trip: queue the PKCE verifier cookie and obtain the
    /// provider URL the browser must visit.
    pub async fn sign_in_with_oauth(
        &mut self,
        provider_kind: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, ProviderError> {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let verifier_cookie = self.settings.verifier_cookie(verifier.secret());
        self.push_write(verifier_cookie);

        let provider = Arc::clone(&self.provider);
        let response = self
            .bounded(
                "begin_authorization",
                provider.begin_authorization(provider_kind, redirect_to, challenge.as_str()),
            )
            .await?;

        response.url.ok_or(ProviderError::MissingRedirectUrl)
    }

    /// Exchange a one-time authorization code and store the resulting session
    pub async fn exchange_code_for_session(&mut self, code: &str) -> Result<Session, ProviderError> {
        let verifier_key = self.settings.verifier_key();
        let verifier = self
            .jar
            .get(&verifier_key)
            .map(|c| c.value().to_string())
            .ok_or(ProviderError::MissingCodeVerifier)?;

        let provider = Arc::clone(&self.provider);
        let result = self
            .bounded("exchange_code", provider.exchange_code(code, &verifier))
            .await;

        let session = match result {
            Ok(session) => session.stamped(unix_now()),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    code = %token_fingerprint(code),
                    "Authorization code exchange failed"
                );
                return Err(e);
            }
        };

        self.store_session(&session);
        let removal = self.settings.removal_cookie(verifier_key);
        self.push_write(removal);
        Ok(session)
    }

    /// Forget the session on this browser (no provider-side revocation)
    pub fn sign_out_locally(&mut self) {
        self.clear_session();
        if self.jar.get(&self.settings.verifier_key()).is_some() {
            let removal = self.settings.removal_cookie(self.settings.verifier_key());
            self.push_write(removal);
        }
    }

    /// Working jar reflecting every write made so far
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Drain the pending writes in the order they were made
    pub fn take_cookie_writes(&mut self) -> Vec<Cookie<'static>> {
        std::mem::take(&mut self.writes)
    }
}
