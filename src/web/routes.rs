use super::handlers::{
    dashboard_handler, healthz_handler, landing_handler, login_page_handler, readyz_handler,
};
use crate::{
    auth::{
        auth_code_error_handler, callback_handler, login_handler, signout_handler,
        synchronize_session,
    },
    AppState,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/login", get(login_page_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/auth-code-error", get(auth_code_error_handler))
        .route("/auth/signout", post(signout_handler))
        .nest_service("/static", ServeDir::new("static"))
        // Session synchronization runs ahead of every route
        .layer(middleware::from_fn_with_state(
            state.clone(),
            synchronize_session,
        ))
        .with_state(state)
}
