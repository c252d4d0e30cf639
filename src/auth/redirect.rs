//! Redirect target resolution
//!
//! Two resolvers live here and are intentionally kept separate:
//!
//! - [`resolve_redirect_base`]: where the identity provider should send the browser
//!   back to. Operator configuration always beats request headers.
//! - [`resolve_callback_host`]: where the browser lands after a successful code
//!   exchange. Behind a reverse proxy in production this honours `x-forwarded-host`.
//!
//! Both are pure functions of configuration + request headers.

use axum::http::{header, HeaderMap};

use crate::config::Config;

/// Last-resort redirect base for local development
pub const LOCAL_DEFAULT_BASE: &str = "http://localhost:3000";

/// Post-login destination when `next` is missing or unusable
pub const DEFAULT_NEXT: &str = "/dashboard";

pub const CALLBACK_PATH: &str = "/auth/callback";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Hostnames (with optional port) only; anything carrying a path, userinfo or
/// whitespace is refused.
fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

/// Base URL for the OAuth callback and other absolute links.
///
/// Precedence: `PUBLIC_SITE_URL` > `https://DEPLOYMENT_HOST` > `Origin` header >
/// `http://localhost:3000`.
pub fn resolve_redirect_base(config: &Config, headers: &HeaderMap) -> String {
    if let Some(site_url) = config
        .public_site_url
        .as_deref()
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
    {
        return site_url.to_string();
    }

    // Platforms differ on whether the deployment host carries a scheme
    if let Some(host) = config
        .deployment_host
        .as_deref()
        .map(|s| {
            let s = s.trim();
            s.strip_prefix("https://")
                .or_else(|| s.strip_prefix("http://"))
                .unwrap_or(s)
                .trim_end_matches('/')
        })
        .filter(|s| !s.is_empty())
    {
        return format!("https://{}", host);
    }

    // Browsers send the literal "null" for opaque origins
    if let Some(origin) = header_str(headers, header::ORIGIN.as_str()).filter(|o| *o != "null") {
        return origin.trim_end_matches('/').to_string();
    }

    LOCAL_DEFAULT_BASE.to_string()
}

/// `<base>/auth/callback`, carrying `next` through the round trip when given
pub fn callback_url(base: &str, next: Option<&str>) -> String {
    match next.and_then(safe_next) {
        Some(next) => format!(
            "{}{}?next={}",
            base,
            CALLBACK_PATH,
            urlencoding::encode(next)
        ),
        None => format!("{}{}", base, CALLBACK_PATH),
    }
}

/// Origin of the inbound request as the server sees it (`Host` header).
///
/// The scheme is taken from `x-forwarded-proto` when it is `http` or `https`,
/// otherwise plain `http`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = header_str(headers, header::HOST.as_str()).filter(|h| is_valid_host(h))?;
    let scheme = header_str(headers, "x-forwarded-proto")
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| *p == "http" || *p == "https")
        .unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

/// Client-facing host reported by the reverse proxy (first hop only)
pub fn forwarded_host(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, "x-forwarded-host")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|h| is_valid_host(h))
}

/// Host for the post-login redirect.
///
/// - development: the request origin
/// - production behind a proxy: `https://<x-forwarded-host>`
/// - production otherwise: the request origin
///
/// Without a usable `Host` header the general redirect base stands in for the
/// request origin.
pub fn resolve_callback_host(config: &Config, headers: &HeaderMap) -> String {
    let origin =
        request_origin(headers).unwrap_or_else(|| resolve_redirect_base(config, headers));

    if !config.is_production() {
        return origin;
    }

    match forwarded_host(headers) {
        Some(host) => format!("https://{}", host),
        None => origin,
    }
}

/// Accept only same-site absolute paths (`/x`, not `//host`, `/\host` or `https://..`)
pub fn safe_next(next: &str) -> Option<&str> {
    let ok = next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(|c| c.is_control());
    ok.then_some(next)
}

/// `next` from the query, falling back to [`DEFAULT_NEXT`]
pub fn next_path(next: Option<&str>) -> &str {
    next.and_then(safe_next).unwrap_or(DEFAULT_NEXT)
}
