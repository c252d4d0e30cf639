//! Session synchronization middleware
//!
//! Runs ahead of every handler. It reads the session from the inbound cookies,
//! lets the provider refresh it if needed, then validates the identity so the
//! cookies are current before any handler executes.
//!
//! Cookie writes are collected during the provider calls and applied in two
//! places: the forwarded request's `Cookie` header (so handlers in this request
//! see the refreshed session) and, once the handler has produced its response,
//! the outbound `Set-Cookie` headers. Nothing reaches the response before that.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::Cookie;
use std::sync::Arc;

use super::client::SessionClient;
use super::cookies::{append_set_cookies, request_cookie_header, response_cookie_names};
use crate::AppState;

/// Paths that never carry user sessions
fn should_synchronize(path: &str) -> bool {
    !(path.starts_with("/static/")
        || path == "/healthz"
        || path == "/readyz"
        || path == "/favicon.ico")
}

/// Append pending writes to the response, skipping any cookie name the handler
/// already set (the handler's value is the newer one).
pub fn apply_pending_writes(headers: &mut HeaderMap, writes: &[Cookie<'static>]) {
    if writes.is_empty() {
        return;
    }
    let handler_set = response_cookie_names(headers);
    append_set_cookies(
        headers,
        writes.iter().filter(|c| !handler_set.contains(c.name())),
    );
}

pub async fn synchronize_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if !should_synchronize(req.uri().path()) {
        return next.run(req).await;
    }

    // No provider configured: auth-free parts of the app keep working
    let mut client = match SessionClient::from_state(&state, req.headers()) {
        Ok(client) => client,
        Err(_) => return next.run(req).await,
    };

    match client.get_session().await {
        Ok(Some(_)) => match client.get_user().await {
            Ok(Some(identity)) => {
                tracing::debug!(user_id = %identity.id, "Session synchronized");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Identity validation failed; request continues unauthenticated");
            }
        },
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(error = %e, "Session read failed; request continues unauthenticated");
        }
    }

    let writes = client.take_cookie_writes();
    if !writes.is_empty() {
        match request_cookie_header(client.jar()) {
            Some(value) => {
                req.headers_mut().insert(header::COOKIE, value);
            }
            None => {
                req.headers_mut().remove(header::COOKIE);
            }
        }
        tracing::debug!(
            cookie_writes = writes.len(),
            "Session cookies rewritten for this request"
        );
    }

    let mut response = next.run(req).await;
    apply_pending_writes(response.headers_mut(), &writes);
    response
}
