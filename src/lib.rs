//! Media kit web service library
//!
//! Provides authentication, session synchronization and page routing for the
//! creator media kit.

#![deny(dead_code)]

pub mod auth;
pub mod config;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

use auth::{GoTrueClient, IdentityProvider};
use config::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// None when AUTH_PROVIDER_URL / AUTH_PROVIDER_KEY are missing
    pub provider: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Build shared state, creating the provider client when configured
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let provider: Option<Arc<dyn IdentityProvider>> = match &config.provider {
            Some(provider_config) => {
                let client = GoTrueClient::new(
                    provider_config,
                    config.http_connect_timeout_secs,
                    config.http_request_timeout_secs,
                )
                .map_err(|e| anyhow::anyhow!("Failed to build identity provider client: {}", e))?;
                Some(Arc::new(client) as Arc<dyn IdentityProvider>)
            }
            None => {
                tracing::warn!(
                    "AUTH_PROVIDER_URL / AUTH_PROVIDER_KEY not set; sessions are not synchronized and login is disabled"
                );
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            provider,
        })
    }
}
