//! HTTP seam shared by both providers, plus the retry/backoff loop.
//!
//! Providers never call `reqwest` directly: they build an [`HttpRequest`] and
//! hand it to [`send_with_retry`] together with a host-specific rate-limit
//! detector. This keeps the retry state machine in one place:
//!
//! `Requesting → Success | RateLimited → Backoff → Requesting | TransientError → Backoff → Requesting | FatalError`
//!
//! The backoff state ([`Backoff`]) is a plain value owned by one call, so
//! concurrent fetches never share counters.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use mockall::automock;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::ConvertError;

pub const USER_AGENT: &str = concat!("remd/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ConvertError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection interrupted: {0}")]
    Interrupted(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Other(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_request() || e.is_body() {
            TransportError::Interrupted(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// A single GET round-trip. Implemented over `reqwest` in production and
/// mocked in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConvertError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Retry ceilings and delays. Copied into a fresh [`Backoff`] for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub max_transient_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for a single wait; a longer advertised reset is not waited for.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 4,
            max_transient_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; retry counts unchanged.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Per-call retry state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    rate_limit_retries: u32,
    transient_retries: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rate_limit_retries: 0,
            transient_retries: 0,
        }
    }

    /// Delay before the next attempt after a rate-limit response, or `None`
    /// when retrying is exhausted or the host asks for a longer wait than allowed.
    pub fn next_rate_limit_delay(&mut self, advertised: Option<Duration>) -> Option<Duration> {
        if self.rate_limit_retries >= self.policy.max_rate_limit_retries {
            return None;
        }
        let delay = match advertised {
            Some(wait) if wait > self.policy.max_delay => return None,
            Some(wait) => wait,
            None => with_jitter(self.exponential(self.rate_limit_retries)),
        };
        self.rate_limit_retries += 1;
        Some(delay)
    }

    pub fn next_transient_delay(&mut self) -> Option<Duration> {
        if self.transient_retries >= self.policy.max_transient_retries {
            return None;
        }
        let delay = with_jitter(self.exponential(self.transient_retries));
        self.transient_retries += 1;
        Some(delay)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        self.policy
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.policy.max_delay)
    }
}

// Adds up to 50% random jitter.
fn with_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    delay + delay.mul_f64(jitter_fraction())
}

/// Uniform-ish value in `[0, 0.5)`.
///
/// Only the low 62 bits of a v4 UUID are random (the version and variant
/// fields sit above them), so only those bits are read.
fn jitter_fraction() -> f64 {
    const RANDOM_BITS: u128 = (1 << 62) - 1;
    let random = uuid::Uuid::new_v4().as_u128() & RANDOM_BITS;
    (random % 1000) as f64 / 2000.0
}

/// Host verdict on a response: `Some` means "rate limited", carrying the
/// advertised wait when the host sent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub wait: Option<Duration>,
}

pub type RateLimitDetector = fn(&HttpResponse, SystemTime) -> Option<RateLimited>;

fn is_transient_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// Send `request`, retrying rate limits and transient failures per `policy`.
///
/// Returns the first response that is neither rate limited nor a transient
/// gateway error (or the last one once transient retries are spent); status
/// mapping is left to the caller.
pub async fn send_with_retry(
    transport: &dyn HttpTransport,
    request: &HttpRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    detect: RateLimitDetector,
) -> Result<HttpResponse, ConvertError> {
    let mut backoff = Backoff::new(*policy);
    loop {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        debug!(url = %request.url, "HTTP GET");
        let delay = match transport.get(request).await {
            Ok(response) => {
                if let Some(limit) = detect(&response, SystemTime::now()) {
                    let Some(delay) = backoff.next_rate_limit_delay(limit.wait) else {
                        return Err(ConvertError::RateLimitExceeded(match limit.wait {
                            Some(wait) => format!(
                                "{} (resets in {}s)",
                                request.url.host_str().unwrap_or_default(),
                                wait.as_secs()
                            ),
                            None => request.url.host_str().unwrap_or_default().to_string(),
                        }));
                    };
                    warn!(url = %request.url, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
                    delay
                } else if is_transient_status(response.status) {
                    match backoff.next_transient_delay() {
                        Some(delay) => {
                            warn!(url = %request.url, status = response.status, delay_ms = delay.as_millis() as u64, "Transient upstream status, retrying");
                            delay
                        }
                        None => return Ok(response),
                    }
                } else {
                    return Ok(response);
                }
            }
            Err(e) if e.is_transient() => match backoff.next_transient_delay() {
                Some(delay) => {
                    warn!(url = %request.url, error = %e, delay_ms = delay.as_millis() as u64, "Transient network error, retrying");
                    delay
                }
                None => return Err(ConvertError::Network(format!("{}: {e}", request.url))),
            },
            Err(e) => return Err(ConvertError::Network(format!("{}: {e}", request.url))),
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
        }
    }
}

/// Seconds from a `Retry-After` header (the delta-seconds form only).
pub fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
