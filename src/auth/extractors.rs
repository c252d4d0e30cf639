use crate::auth::client::SessionClient;
use crate::auth::provider::Identity;
use crate::AppState;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
    response::Redirect,
};
use std::sync::Arc;

/// Login entry point for unauthenticated visitors
pub const LOGIN_PATH: &str = "/login";

/// Gate for protected pages.
///
/// Validates the stored access token with the provider (never a cached value),
/// so it reflects whatever the session synchronizer just wrote into the request.
/// It never refreshes: an expired token means the synchronizer could not refresh
/// it, and the cookies are left for the next request to retry. Any failure to
/// produce an identity is a redirect to the login page.
pub async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Identity, Redirect> {
    let client = match SessionClient::from_state(state, headers) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Route guard without identity provider; denying access");
            return Err(Redirect::to(LOGIN_PATH));
        }
    };

    match client.get_user_without_refresh().await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => {
            tracing::debug!("No session; redirecting to login");
            Err(Redirect::to(LOGIN_PATH))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Session could not be validated; redirecting to login");
            Err(Redirect::to(LOGIN_PATH))
        }
    }
}

/// Authenticated identity extractor - redirects to `/login` when absent
///
/// Usage:
/// ```rust,ignore
/// async fn handler(RequireSession(identity): RequireSession) {
///     // Only runs for authenticated visitors
///     println!("User: {}", identity.id);
/// }
/// ```
///
/// Routes using this extractor must sit behind the session synchronizer, which
/// owns refreshing and the resulting cookie writes.
pub struct RequireSession(pub Identity);

impl<S> FromRequestParts<S> for RequireSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        require_session(&app_state, &parts.headers)
            .await
            .map(RequireSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        expired_session, fresh_session, session_cookie_header, test_state, unconfigured_state,
        FakeProvider,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn protected_app(state: Arc<AppState>, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/protected",
                get(move |RequireSession(identity): RequireSession| {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        identity.id
                    }
                }),
            )
            .with_state(state)
    }

    fn request(cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/protected");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_no_session_redirects_and_skips_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = protected_app(test_state(Arc::new(FakeProvider::default())), hits.clone());

        let response = app.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_session_runs_handler_once_with_identity() {
        let hits = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(FakeProvider::default());
        let app = protected_app(test_state(provider.clone()), hits.clone());
        let cookie = session_cookie_header(&fresh_session("access-1", "refresh-1"));

        let response = app.oneshot(request(Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"user-1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(provider.user_calls(), 1);
    }

    #[tokio::test]
    async fn test_revoked_token_redirects() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = protected_app(test_state(Arc::new(FakeProvider::default())), hits.clone());
        let cookie = session_cookie_header(&fresh_session("revoked", "refresh-1"));

        let response = app.oneshot(request(Some(&cookie))).await.unwrap();

        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_denies() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = protected_app(unconfigured_state(), hits.clone());
        let cookie = session_cookie_header(&fresh_session("access-1", "refresh-1"));

        let response = app.oneshot(request(Some(&cookie))).await.unwrap();

        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_session_redirects_without_refreshing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(FakeProvider::default());
        let app = protected_app(test_state(provider.clone()), hits.clone());
        let cookie = session_cookie_header(&expired_session("old", "refresh-1"));

        let response = app.oneshot(request(Some(&cookie))).await.unwrap();

        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(provider.refresh_calls(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
