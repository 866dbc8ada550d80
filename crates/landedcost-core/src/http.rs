//! Retrying JSON fetcher and per-provider circuit breaker
//!
//! External rate APIs are fetched with a bounded retry budget; sustained
//! failure trips a breaker so the providers fall back to their database
//! tiers instead of hammering a dead endpoint.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Exponential backoff schedule for transient HTTP failures
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base multiplier applied to 2^attempt
    pub multiplier: f64,

    /// Minimum delay between attempts
    pub min_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Total attempts before surfacing the failure
    pub max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            multiplier: 0.5,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            max_attempts: 3,
        }
    }
}

impl ExponentialBackoff {
    /// Delay before the retry following `attempt` (1-based), clamped to
    /// `[min_delay, max_delay]`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier * 2f64.powi(attempt as i32);
        let raw = Duration::from_secs_f64(exp);
        raw.clamp(self.min_delay, self.max_delay)
    }
}

/// Retrying JSON GET client shared by all providers
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: ExponentialBackoff,
}

impl HttpFetcher {
    /// Build a fetcher with the given request deadline
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            backoff: ExponentialBackoff::default(),
        })
    }

    /// GET a JSON document, retrying transient failures with exponential
    /// backoff before surfacing the last error
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_get_json(url, headers, params).await {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    if attempt >= self.backoff.max_attempts {
                        warn!("HTTP GET {} failed after {} attempts: {}", url, attempt, e);
                        return Err(e);
                    }
                    let delay = self.backoff.delay_for(attempt);
                    debug!(
                        "HTTP GET {} attempt {} failed ({}), retrying in {:?}",
                        url, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request.send().await?;
        let response = response
            .error_for_status()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(response.json().await?)
    }
}

/// Per-provider-instance circuit breaker.
///
/// Counts consecutive failures; three in a row open the circuit for 30
/// seconds, after which a single probe is allowed through. Races on the
/// counter across requests are tolerable (one extra probe at worst).
#[derive(Debug)]
pub struct CircuitBreaker {
    max_failures: u32,
    reset_window: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug, Default)]
struct BreakerState {
    failures: u32,
    last_failure: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_window: Duration) -> Self {
        Self {
            max_failures,
            reset_window,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether a call may proceed right now
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.failures = 0;
        state.last_failure = None;
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        if state.failures < self.max_failures {
            return true;
        }
        let Some(last) = state.last_failure else {
            return true;
        };
        if now.duration_since(last) > self.reset_window {
            // Half-open: reset and let one probe through
            state.failures = 0;
            state.last_failure = None;
            return true;
        }
        false
    }

    fn record_failure_at(&self, now: Instant) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.failures += 1;
        state.last_failure = Some(now);
    }
}
