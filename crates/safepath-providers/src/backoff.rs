//! Exponential backoff with jitter for provider HTTP calls.
//!
//! Each request is retried a bounded number of times on connection errors,
//! timeouts, HTTP 429 and 5xx. Other 4xx responses are permanent.

use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::Rng;
use reqwest::{RequestBuilder, Response, StatusCode};

const JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct Backoff {
    max: Duration,
    current: Duration,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            max,
            current: base,
            jitter_ratio: JITTER_RATIO,
        }
    }

    /// Delay before the next attempt. Doubles up to `max`, plus jitter.
    pub fn fail(&mut self) -> Duration {
        let delay = add_jitter(self.current, self.jitter_ratio);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) {
        return delay;
    }
    let jitter_ms_max = (delay.as_millis() as f64 * ratio) as u64;
    if jitter_ms_max == 0 {
        return delay;
    }
    let jitter_ms = rand::rng().random_range(0..=jitter_ms_max);
    delay + Duration::from_millis(jitter_ms)
}

/// Retry limits shared by the HTTP providers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_delay)
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request built fresh on every attempt and return the first
/// successful response.
///
/// `build_request` is called per attempt since builders are consumed by
/// `send()`.
pub async fn send_with_retry<F>(policy: &RetryPolicy, build_request: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0u32;

    loop {
        let failure = match build_request().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) if is_retryable_status(response.status()) => {
                anyhow!("HTTP {} from {}", response.status(), response.url())
            }
            Ok(response) => {
                return Err(anyhow!("HTTP {} from {}", response.status(), response.url()));
            }
            Err(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                anyhow!(err)
            }
            Err(err) => return Err(anyhow!(err)),
        };

        if attempt >= policy.retries {
            return Err(failure.context(format!("giving up after {} attempts", attempt + 1)));
        }
        attempt += 1;

        let delay = backoff.fail();
        tracing::warn!(
            "Provider request failed (attempt {}/{}), retrying in {:?}: {}",
            attempt,
            policy.retries + 1,
            delay,
            failure
        );
        tokio::time::sleep(delay).await;
    }
}
