//! Session cookie codec
//!
//! A session is stored as `base64-<urlsafe base64 of the session JSON>` under the
//! storage key. Values longer than [`MAX_CHUNK_SIZE`] are split across
//! `<key>.0`, `<key>.1`, ... so that no single cookie exceeds browser limits.
//!
//! Every cookie this service emits is built here, so all writes share the same
//! attribute set (path, same-site, secure, domain, max-age).

use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::collections::HashSet;
use time::Duration;

use super::provider::Session;
use crate::config::Config;

/// Largest value stored in one cookie before chunking kicks in
pub const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";
const SESSION_MAX_AGE: Duration = Duration::days(400);
const VERIFIER_MAX_AGE: Duration = Duration::minutes(10);

/// Derive the storage key from the provider URL: `sb-<first host label>-auth-token`
pub fn storage_key_for(provider_url: &str) -> String {
    let label = url::Url::parse(provider_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_string()))
        .unwrap_or_else(|| "local".to_string());
    format!("sb-{}-auth-token", label)
}

/// Naming and attributes for every auth cookie
#[derive(Debug, Clone, PartialEq)]
pub struct CookieSettings {
    pub storage_key: String,
    pub secure: bool,
    pub domain: Option<String>,
}

impl CookieSettings {
    /// Returns None when no identity provider is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let provider = config.provider.as_ref()?;
        let storage_key = config
            .session_cookie_name
            .clone()
            .unwrap_or_else(|| storage_key_for(&provider.url));

        Some(Self {
            storage_key,
            secure: config.cookie_secure(),
            domain: config.cookie_domain.clone(),
        })
    }

    pub fn verifier_key(&self) -> String {
        format!("{}-code-verifier", self.storage_key)
    }

    fn build(&self, name: String, value: String, max_age: Duration) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .secure(self.secure)
            .max_age(max_age);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    pub fn session_cookie(&self, name: String, value: String) -> Cookie<'static> {
        self.build(name, value, SESSION_MAX_AGE)
    }

    pub fn verifier_cookie(&self, verifier: &str) -> Cookie<'static> {
        self.build(self.verifier_key(), verifier.to_string(), VERIFIER_MAX_AGE)
    }

    /// Removal cookie: same path/domain as the original, empty value, Max-Age=0
    pub fn removal_cookie(&self, name: String) -> Cookie<'static> {
        self.build(name, String::new(), Duration::ZERO)
    }
}

/// True if this write deletes the cookie in the browser
pub fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age() == Some(Duration::ZERO)
}

pub fn encode_session(session: &Session) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(session)?;
    Ok(format!("{}{}", BASE64_PREFIX, URL_SAFE_NO_PAD.encode(json)))
}

/// Decode a stored session. Accepts both the `base64-` form and raw JSON.
pub fn decode_session(value: &str) -> Option<Session> {
    let bytes = match value.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => URL_SAFE_NO_PAD.decode(encoded).ok()?,
        None => value.as_bytes().to_vec(),
    };
    serde_json::from_slice(&bytes).ok()
}

fn chunk_name(key: &str, index: usize) -> String {
    format!("{}.{}", key, index)
}

fn existing_chunk_count(jar: &CookieJar, key: &str) -> usize {
    (0..)
        .take_while(|i| jar.get(&chunk_name(key, *i)).is_some())
        .count()
}

/// Read a possibly chunked value. An un-chunked cookie takes precedence.
pub fn read_chunked(jar: &CookieJar, key: &str) -> Option<String> {
    if let Some(cookie) = jar.get(key) {
        return Some(cookie.value().to_string());
    }

    let count = existing_chunk_count(jar, key);
    if count == 0 {
        return None;
    }

    Some(
        (0..count)
            .filter_map(|i| jar.get(&chunk_name(key, i)).map(|c| c.value().to_string()))
            .collect(),
    )
}

/// Cookie writes that store `value` under `key`, including removals of any
/// stale representation already present in `jar`.
pub fn chunked_writes(
    jar: &CookieJar,
    settings: &CookieSettings,
    key: &str,
    value: &str,
) -> Vec<Cookie<'static>> {
    let existing_chunks = existing_chunk_count(jar, key);
    let mut writes = Vec::new();

    if value.len() <= MAX_CHUNK_SIZE {
        writes.push(settings.session_cookie(key.to_string(), value.to_string()));
        for i in 0..existing_chunks {
            writes.push(settings.removal_cookie(chunk_name(key, i)));
        }
        return writes;
    }

    // Values are ASCII (base64), so byte chunks are valid strings
    let chunks: Vec<String> = value
        .as_bytes()
        .chunks(MAX_CHUNK_SIZE)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect();

    for (i, chunk) in chunks.iter().enumerate() {
        writes.push(settings.session_cookie(chunk_name(key, i), chunk.clone()));
    }
    for i in chunks.len()..existing_chunks {
        writes.push(settings.removal_cookie(chunk_name(key, i)));
    }
    if jar.get(key).is_some() {
        writes.push(settings.removal_cookie(key.to_string()));
    }
    writes
}

/// Removal writes for every representation of `key` present in `jar`
pub fn removal_writes(jar: &CookieJar, settings: &CookieSettings, key: &str) -> Vec<Cookie<'static>> {
    let mut writes = Vec::new();
    if jar.get(key).is_some() {
        writes.push(settings.removal_cookie(key.to_string()));
    }
    for i in 0..existing_chunk_count(jar, key) {
        writes.push(settings.removal_cookie(chunk_name(key, i)));
    }
    writes
}

/// Apply a write to a request-side jar (removals delete, everything else replaces)
pub fn apply_to_jar(jar: CookieJar, cookie: &Cookie<'static>) -> CookieJar {
    if is_removal(cookie) {
        jar.remove(Cookie::new(cookie.name().to_string(), ""))
    } else {
        jar.add(Cookie::new(
            cookie.name().to_string(),
            cookie.value().to_string(),
        ))
    }
}

/// Render a jar as a request `Cookie` header (`a=1; b=2`). None when empty.
pub fn request_cookie_header(jar: &CookieJar) -> Option<HeaderValue> {
    let pairs: Vec<String> = jar
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    HeaderValue::from_str(&pairs.join("; ")).ok()
}

/// Append each cookie as its own `Set-Cookie` header, attributes intact
pub fn append_set_cookies<'a, I>(headers: &mut HeaderMap, cookies: I)
where
    I: IntoIterator<Item = &'a Cookie<'static>>,
{
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    cookie = %cookie.name(),
                    "Failed to create Set-Cookie header - possible malformed value"
                );
            }
        }
    }
}

/// Names of cookies already set on a response
pub fn response_cookie_names(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|s| Cookie::parse(s.to_string()).ok())
        .map(|c| c.name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secure: bool) -> CookieSettings {
        CookieSettings {
            storage_key: "sb-abc-auth-token".to_string(),
            secure,
            domain: None,
        }
    }

    fn jar_from(cookie_header: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie_header).unwrap());
        CookieJar::from_headers(&headers)
    }

    fn session_with_metadata(padding: usize) -> Session {
        Session {
            access_token: "a".repeat(padding),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at: Some(1_900_000_000),
            user: None,
        }
    }

    #[test]
    fn test_storage_key_uses_first_host_label() {
        assert_eq!(
            storage_key_for("https://abcdefgh.supabase.co"),
            "sb-abcdefgh-auth-token"
        );
        assert_eq!(storage_key_for("http://localhost:54321"), "sb-localhost-auth-token");
        assert_eq!(storage_key_for("garbage"), "sb-local-auth-token");
    }

    #[test]
    fn test_session_encoding_round_trip() {
        let session = session_with_metadata(10);
        let encoded = encode_session(&session).unwrap();
        assert!(encoded.starts_with("base64-"));
        assert_eq!(decode_session(&encoded), Some(session));
    }

    #[test]
    fn test_decode_accepts_raw_json_and_rejects_garbage() {
        let raw = r#"{"access_token":"a","refresh_token":"r"}"#;
        assert_eq!(decode_session(raw).unwrap().access_token, "a");
        assert!(decode_session("base64-!!!").is_none());
        assert!(decode_session("not json").is_none());
    }

    #[test]
    fn test_session_cookie_carries_full_attribute_set() {
        let cookie = settings(true).session_cookie("sb-abc-auth-token".into(), "v".into());
        let rendered = cookie.to_string();
        assert!(rendered.starts_with("sb-abc-auth-token=v"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("Max-Age=34560000"));
    }

    #[test]
    fn test_development_cookies_are_not_secure() {
        let rendered = settings(false)
            .session_cookie("k".into(), "v".into())
            .to_string();
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn test_domain_attribute_when_configured() {
        let mut s = settings(false);
        s.domain = Some("kit.example".to_string());
        let rendered = s.removal_cookie("k".into()).to_string();
        assert!(rendered.contains("Domain=kit.example"));
        assert!(rendered.contains("Max-Age=0"));
    }

    #[test]
    fn test_small_value_replaces_stale_chunks() {
        let jar = jar_from("sb-abc-auth-token.0=x; sb-abc-auth-token.1=y");
        let writes = chunked_writes(&jar, &settings(false), "sb-abc-auth-token", "small");

        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].name(), "sb-abc-auth-token");
        assert!(!is_removal(&writes[0]));
        assert!(writes[1..].iter().all(is_removal));
    }

    #[test]
    fn test_large_value_is_chunked_and_reassembled() {
        let session = session_with_metadata(MAX_CHUNK_SIZE * 2);
        let value = encode_session(&session).unwrap();
        let jar = jar_from("sb-abc-auth-token=old");

        let writes = chunked_writes(&jar, &settings(false), "sb-abc-auth-token", &value);
        let set: Vec<_> = writes.iter().filter(|c| !is_removal(c)).collect();
        assert_eq!(set.len(), 3);
        assert!(set.iter().all(|c| c.value().len() <= MAX_CHUNK_SIZE));
        // The old un-chunked cookie must go, or it would shadow the chunks
        assert!(writes
            .iter()
            .any(|c| is_removal(c) && c.name() == "sb-abc-auth-token"));

        let jar = writes.iter().fold(jar, apply_to_jar);
        let stored = read_chunked(&jar, "sb-abc-auth-token").unwrap();
        assert_eq!(decode_session(&stored), Some(session));
    }

    #[test]
    fn test_removal_writes_cover_every_chunk() {
        let jar = jar_from("other=1; sb-abc-auth-token.0=x; sb-abc-auth-token.1=y");
        let writes = removal_writes(&jar, &settings(false), "sb-abc-auth-token");
        let names: Vec<_> = writes.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["sb-abc-auth-token.0", "sb-abc-auth-token.1"]);

        let jar = writes.iter().fold(jar, apply_to_jar);
        assert!(read_chunked(&jar, "sb-abc-auth-token").is_none());
        assert_eq!(
            request_cookie_header(&jar).unwrap().to_str().unwrap(),
            "other=1"
        );
    }

    #[test]
    fn test_request_cookie_header_empty_jar() {
        assert!(request_cookie_header(&CookieJar::new()).is_none());
    }

    #[test]
    fn test_response_cookie_names() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("a=1; Path=/; HttpOnly"),
        );
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=; Max-Age=0"));
        let names = response_cookie_names(&headers);
        assert!(names.contains("a"));
        assert!(names.contains("b"));
        assert_eq!(names.len(), 2);
    }
}
