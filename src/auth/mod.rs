//! Authentication module
//!
//! OAuth login against an external identity provider and per-request session
//! synchronization through cookies.
//!
//! ## Structure
//!
//! - `provider`: identity provider trait and the session/identity types it returns
//! - `gotrue`: HTTP implementation of the provider trait
//! - `cookies`: session cookie codec (encoding, chunking, attributes)
//! - `client`: request-scoped session client (read, refresh, exchange, sign-in)
//! - `redirect`: redirect base and post-login host resolution
//! - `handlers`: login, callback, sign-out and error page handlers
//! - `sync`: middleware that refreshes the session ahead of every handler
//! - `extractors`: route guard for protected pages
//!
//! ## Authentication Flow
//!
//! 1. Login page calls `POST /auth/login` → JSON `{url}` + PKCE verifier cookie
//! 2. Browser navigates to the provider (Google) → provider redirects to `/auth/callback`
//! 3. Callback exchanges the code → session cookies → redirect to `<host><next>`
//! 4. Every later request: synchronizer refreshes cookies, guard checks the identity

pub mod client;
pub mod cookies;
pub mod error;
pub mod extractors;
pub mod gotrue;
pub mod handlers;
pub mod provider;
pub mod redirect;
pub mod sync;

// Re-export handlers for convenient routing
pub use handlers::{
    auth_code_error_handler, callback_handler, initiate_login, login_handler, signout_handler,
    CallbackParams, LoginRedirect,
};
pub use sync::synchronize_session;

pub use client::SessionClient;
pub use error::{AuthError, ProviderError};
pub use extractors::{require_session, RequireSession};
pub use gotrue::GoTrueClient;
pub use provider::{Identity, IdentityProvider, OAuthProvider, Session};
pub use redirect::{resolve_callback_host, resolve_redirect_base};
