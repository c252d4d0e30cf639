use super::templates::{DashboardTemplate, LandingTemplate, LoginTemplate};
use crate::{
    auth::{extractors::RequireSession, redirect::safe_next},
    AppState,
};
use askama::Template;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

fn render(template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Template render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

/// Liveness probe - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe - 503 until an identity provider is configured, since
/// login and every protected page depend on it.
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.provider.is_some() {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("Readiness check failed: identity provider not configured");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready: identity provider not configured",
        )
    }
}

pub async fn landing_handler(State(state): State<Arc<AppState>>) -> Response {
    render(&LandingTemplate {
        auth_enabled: state.provider.is_some(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginPageQuery {
    pub next: Option<String>,
}

pub async fn login_page_handler(Query(query): Query<LoginPageQuery>) -> Response {
    let next = query
        .next
        .as_deref()
        .and_then(safe_next)
        .map(str::to_string);
    render(&LoginTemplate { next })
}

pub async fn dashboard_handler(RequireSession(identity): RequireSession) -> Response {
    tracing::debug!(user_id = %identity.id, "Rendering dashboard");

    render(&DashboardTemplate {
        display_name: identity.display_name().to_string(),
        email: identity.email.clone(),
    })
}
