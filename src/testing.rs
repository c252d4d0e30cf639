//! Test fixtures: an in-memory identity provider and preconfigured state

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::auth::cookies::{encode_session, CookieSettings};
use crate::auth::error::ProviderError;
use crate::auth::provider::{
    AuthorizationResponse, Identity, IdentityProvider, OAuthProvider, Session,
};
use crate::config::{Config, Environment, ProviderConfig};
use crate::AppState;

pub const TEST_STORAGE_KEY: &str = "sb-test-auth-token";

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn test_config() -> Config {
    Config {
        environment: Environment::Development,
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        public_site_url: None,
        deployment_host: None,
        provider: Some(ProviderConfig {
            url: "https://test.idp.example".to_string(),
            public_key: "anon-key".to_string(),
        }),
        session_cookie_name: Some(TEST_STORAGE_KEY.to_string()),
        cookie_domain: None,
        http_connect_timeout_secs: 1,
        http_request_timeout_secs: 1,
        provider_call_timeout_secs: 1,
        session_refresh_margin_secs: 60,
    }
}

pub fn cookie_settings() -> CookieSettings {
    CookieSettings {
        storage_key: TEST_STORAGE_KEY.to_string(),
        secure: false,
        domain: None,
    }
}

pub fn test_identity() -> Identity {
    Identity {
        id: "user-1".to_string(),
        email: Some("kit@example.com".to_string()),
        user_metadata: serde_json::Value::Null,
    }
}

fn session_expiring_at(access: &str, refresh: &str, expires_at: i64) -> Session {
    Session {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "bearer".to_string(),
        expires_in: Some(3600),
        expires_at: Some(expires_at),
        user: Some(test_identity()),
    }
}

pub fn fresh_session(access: &str, refresh: &str) -> Session {
    session_expiring_at(access, refresh, now() + 3600)
}

pub fn expired_session(access: &str, refresh: &str) -> Session {
    session_expiring_at(access, refresh, now() - 10)
}

/// `Cookie` header value carrying `session` under the test storage key
pub fn session_cookie_header(session: &Session) -> String {
    format!(
        "{}={}",
        TEST_STORAGE_KEY,
        encode_session(session).expect("session encodes")
    )
}

pub fn test_state(provider: Arc<FakeProvider>) -> Arc<AppState> {
    Arc::new(AppState {
        config: Arc::new(test_config()),
        provider: Some(provider as Arc<dyn IdentityProvider>),
    })
}

pub fn unconfigured_state() -> Arc<AppState> {
    let mut config = test_config();
    config.provider = None;
    Arc::new(AppState {
        config: Arc::new(config),
        provider: None,
    })
}

/// In-memory provider. Accepts the authorization code `abc`, refreshes any
/// refresh token unless told otherwise, and knows a single user.
#[derive(Default)]
pub struct FakeProvider {
    reject_refresh: bool,
    omit_authorize_url: bool,
    fail_authorize: bool,
    delay: Option<Duration>,
    /// Number of upcoming refreshes answered with a 503
    refresh_outages: AtomicUsize,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    user_calls: AtomicUsize,
    last_redirect_to: Mutex<Option<String>>,
    last_user_token: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn rejecting_refresh(mut self) -> Self {
        self.reject_refresh = true;
        self
    }

    pub fn without_authorize_url(mut self) -> Self {
        self.omit_authorize_url = true;
        self
    }

    pub fn failing_authorize(mut self) -> Self {
        self.fail_authorize = true;
        self
    }

    pub fn failing_first_refreshes(self, count: usize) -> Self {
        self.refresh_outages.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn last_redirect_to(&self) -> Option<String> {
        self.last_redirect_to.lock().unwrap().clone()
    }

    pub fn last_user_token(&self) -> Option<String> {
        self.last_user_token.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn rejected(status: u16, code: &str) -> ProviderError {
    ProviderError::Rejected {
        status,
        code: Some(code.to_string()),
        message: code.replace('_', " "),
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn begin_authorization(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        _code_challenge: &str,
    ) -> Result<AuthorizationResponse, ProviderError> {
        self.pause().await;
        *self.last_redirect_to.lock().unwrap() = Some(redirect_to.to_string());

        if self.fail_authorize {
            return Err(ProviderError::Request("connection refused".to_string()));
        }
        if self.omit_authorize_url {
            return Ok(AuthorizationResponse { url: None });
        }
        Ok(AuthorizationResponse {
            url: Some(format!(
                "https://idp.test/authorize?provider={}&redirect_to={}",
                provider.as_str(),
                urlencoding::encode(redirect_to)
            )),
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
    ) -> Result<Session, ProviderError> {
        self.pause().await;
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if code == "abc" {
            Ok(fresh_session("exchanged-access", "exchanged-refresh"))
        } else {
            Err(rejected(400, "invalid_grant"))
        }
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, ProviderError> {
        self.pause().await;
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_refresh {
            return Err(rejected(400, "refresh_token_already_used"));
        }
        let outage = self
            .refresh_outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if outage {
            return Err(rejected(503, "service_unavailable"));
        }
        Ok(fresh_session("refreshed-access", "refreshed-refresh"))
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, ProviderError> {
        self.pause().await;
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_token.lock().unwrap() = Some(access_token.to_string());
        if access_token == "revoked" {
            return Err(rejected(401, "bad_jwt"));
        }
        Ok(test_identity())
    }
}
