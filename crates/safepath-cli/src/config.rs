//! CLI configuration from environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use safepath_providers::{HttpSettings, RetryPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub routing_url: String,
    pub incident_url: String,
    pub rating_url: String,
    pub store_path: PathBuf,
    pub http_timeout_s: u64,
    pub http_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            routing_url: env::var("SAFEPATH_ROUTING_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".to_string()),
            incident_url: env::var("SAFEPATH_INCIDENT_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            rating_url: env::var("SAFEPATH_RATING_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            store_path: env::var("SAFEPATH_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("safepath-device.json")),
            http_timeout_s: env::var("SAFEPATH_HTTP_TIMEOUT_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_retries: env::var("SAFEPATH_HTTP_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http_timeout_s.max(1)),
            retry: RetryPolicy::with_retries(self.http_retries),
        }
    }
}
