use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// Identity provider endpoint and public key
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Base URL of the GoTrue-compatible auth server (no trailing slash)
    pub url: String,
    /// Public (anon) key sent as the `apikey` header
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Redirect base inputs (PUBLIC_SITE_URL wins over DEPLOYMENT_HOST)
    pub public_site_url: Option<String>,
    pub deployment_host: Option<String>,

    // Identity provider (None = auth not configured)
    pub provider: Option<ProviderConfig>,

    // Session cookie naming (None = derived from the provider host)
    pub session_cookie_name: Option<String>,

    // Cookie configuration (None = host-only cookie, Some = domain cookie)
    pub cookie_domain: Option<String>,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,

    // Upper bound for a single provider call, enforced around every await
    pub provider_call_timeout_secs: u64,

    // Refresh the session this many seconds before it expires
    pub session_refresh_margin_secs: i64,
}

impl Config {
    /// Load configuration from the process environment
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let environment = match var("ENVIRONMENT_MODE")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let server_host = var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let server_port = match var("SERVER_PORT") {
            Some(s) => s
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a valid port, got {:?}", s))?,
            None => 3000,
        };

        let public_site_url = var("PUBLIC_SITE_URL");
        let deployment_host = var("DEPLOYMENT_HOST");

        // Both halves are required; a partial provider config is treated as absent
        let provider = match (var("AUTH_PROVIDER_URL"), var("AUTH_PROVIDER_KEY")) {
            (Some(url), Some(public_key)) => {
                url::Url::parse(&url).map_err(|e| {
                    anyhow::anyhow!("AUTH_PROVIDER_URL is not a valid URL: {}", e)
                })?;
                Some(ProviderConfig {
                    url: url.trim_end_matches('/').to_string(),
                    public_key,
                })
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Only one of AUTH_PROVIDER_URL / AUTH_PROVIDER_KEY is set; authentication disabled"
                );
                None
            }
            (None, None) => None,
        };

        let session_cookie_name = var("SESSION_COOKIE_NAME");
        let cookie_domain = var("COOKIE_DOMAIN");

        let parse_u64 = |key: &str, default: u64| {
            var(key)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let http_connect_timeout_secs = parse_u64("HTTP_CONNECT_TIMEOUT_SECS", 10);
        let http_request_timeout_secs = parse_u64("HTTP_REQUEST_TIMEOUT_SECS", 30);
        let provider_call_timeout_secs = parse_u64("PROVIDER_CALL_TIMEOUT_SECS", 10);
        let session_refresh_margin_secs = parse_u64("SESSION_REFRESH_MARGIN_SECS", 60) as i64;

        Ok(Config {
            environment,
            server_host,
            server_port,
            public_site_url,
            deployment_host,
            provider,
            session_cookie_name,
            cookie_domain,
            http_connect_timeout_secs,
            http_request_timeout_secs,
            provider_call_timeout_secs,
            session_refresh_margin_secs,
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Cookies carry the Secure flag only in production
    pub fn cookie_secure(&self) -> bool {
        self.is_production()
    }

    pub fn provider_call_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_call_timeout_secs)
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
