//! Shared HTTP client settings for the providers.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::backoff::RetryPolicy;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("safepath/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")
    }
}

/// Base URL without trailing slashes.
pub(crate) fn normalize_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim().trim_end_matches('/').to_string()
}
