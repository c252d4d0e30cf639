//! Authentication handlers for the login round trip
//!
//! - `login_handler`: credential provider gateway, returns the provider URL as JSON
//!   for a client-side navigation
//! - `callback_handler`: terminates the OAuth flow, always answers with a redirect
//! - `signout_handler`: forgets the session on this browser
//! - `auth_code_error_handler`: the single landing page for failed logins

use askama::Template;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::Cookie;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::client::SessionClient;
use super::cookies::append_set_cookies;
use super::error::AuthError;
use super::provider::OAuthProvider;
use super::redirect::{callback_url, next_path, resolve_callback_host, resolve_redirect_base};
use crate::web::templates::AuthCodeErrorTemplate;
use crate::AppState;

pub const ERROR_PAGE_PATH: &str = "/auth/auth-code-error";

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorPageQuery {
    pub error: Option<String>,
}

/// Outcome of a successful login initiation
pub struct LoginRedirect {
    pub url: String,
    /// PKCE verifier cookie that must reach the browser with the URL
    pub cookies: Vec<Cookie<'static>>,
}

/// Error page URL, carrying the provider's error code when there is one
pub fn error_page_url(error: Option<&str>) -> String {
    match error {
        Some(code) => format!("{}?error={}", ERROR_PAGE_PATH, urlencoding::encode(code)),
        None => ERROR_PAGE_PATH.to_string(),
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Ask the identity provider for the Google sign-in URL.
///
/// Not retried on failure: starting an authorization may create provider-side
/// state, so the user decides whether to try again.
pub async fn initiate_login(
    state: &AppState,
    headers: &HeaderMap,
    next: Option<&str>,
) -> Result<LoginRedirect, AuthError> {
    let mut client = SessionClient::from_state(state, headers)?;

    let base = resolve_redirect_base(&state.config, headers);
    let redirect_to = callback_url(&base, next);

    tracing::info!(
        provider = OAuthProvider::Google.as_str(),
        redirect_to = %redirect_to,
        "Starting OAuth login"
    );

    let url = client
        .sign_in_with_oauth(OAuthProvider::Google, &redirect_to)
        .await?;

    Ok(LoginRedirect {
        url,
        cookies: client.take_cookie_writes(),
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// Login handler - returns the provider URL for the login page to navigate to
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Response {
    match initiate_login(&state, &headers, query.next.as_deref()).await {
        Ok(LoginRedirect { url, cookies }) => {
            let mut response = Json(LoginResponse { url }).into_response();
            append_set_cookies(response.headers_mut(), &cookies);
            response
        }
        Err(e) => {
            tracing::warn!(error = %e, "Login initiation failed");
            e.into_response()
        }
    }
}

/// Callback handler - exchanges the authorization code and redirects.
///
/// Every outcome except a missing provider configuration is a redirect: to
/// `<host><next>` on success, otherwise to the error page.
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<CallbackParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable callback query string");
            CallbackParams::default()
        }
    };

    tracing::info!(
        has_code = params.code.is_some(),
        has_error = params.error.is_some(),
        "OAuth callback received"
    );

    // Provider-reported failure (denied consent, provider outage)
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(
            event = "oauth_provider_error",
            error = %error,
            description = ?params.error_description,
            "OAuth authorization failed at the provider"
        );
        return Redirect::to(&error_page_url(Some(error))).into_response();
    }

    if let Some(code) = params.code.as_deref() {
        let mut client = match SessionClient::from_state(&state, &headers) {
            Ok(client) => client,
            Err(e) => return e.into_response(),
        };

        match client.exchange_code_for_session(code).await {
            Ok(session) => {
                let host = resolve_callback_host(&state.config, &headers);
                let target = format!("{}{}", host, next_path(params.next.as_deref()));

                tracing::info!(
                    event = "oauth_login_complete",
                    user_id = ?session.user.as_ref().map(|u| u.id.as_str()),
                    redirect_to = %target,
                    "Authentication successful"
                );

                let mut response = Redirect::to(&target).into_response();
                append_set_cookies(response.headers_mut(), &client.take_cookie_writes());
                return response;
            }
            Err(e) => {
                tracing::warn!(
                    event = "oauth_code_exchange_failed",
                    error = %e,
                    "Could not exchange authorization code"
                );
            }
        }
    } else {
        tracing::warn!("Callback received without code or error");
    }

    Redirect::to(ERROR_PAGE_PATH).into_response()
}

/// Sign-out handler - clears the session cookie set and returns to the landing page
pub async fn signout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut response = Redirect::to("/").into_response();

    match SessionClient::from_state(&state, &headers) {
        Ok(mut client) => {
            client.sign_out_locally();
            let writes = client.take_cookie_writes();
            tracing::info!(
                event = "signed_out",
                cleared_cookies = writes.len(),
                "Session cookies cleared"
            );
            append_set_cookies(response.headers_mut(), &writes);
        }
        Err(e) => {
            tracing::debug!(error = %e, "Sign-out without configured provider");
        }
    }

    response
}

/// Error page - explains likely causes and offers a retry
pub async fn auth_code_error_handler(Query(query): Query<ErrorPageQuery>) -> Response {
    let template = AuthCodeErrorTemplate {
        error_code: query.error,
    };
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(_) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Template error",
        )
            .into_response(),
    }
}
