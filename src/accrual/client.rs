//! HTTP adapter for the accrual service.
//!
//! Maps the service's transport protocol onto [`AccrualOutcome`]:
//! 200 → `Resolved`, 204 → `NotRegistered`, 429 → `RateLimited` (integer
//! `Retry-After` seconds), everything else → `Transient`.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::outcome::{AccrualOutcome, AccrualResponse};
use super::AccrualOracle;
use crate::constants::accrual::{
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_AFTER_SECS, ORDER_ENDPOINT_PREFIX,
};
use crate::error::{LoyaltyError, Result};

/// Configuration for the accrual HTTP client
#[derive(Debug, Clone)]
pub struct HttpAccrualClientConfig {
    /// Service address, e.g. "http://accrual:8080" or "localhost:8080"
    pub base_url: String,
    /// Per-request timeout; expiry maps to `Transient`
    pub request_timeout: Duration,
    /// Back-off used when a 429 has no usable Retry-After
    pub default_retry_after: Duration,
}

impl HttpAccrualClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            default_retry_after: Duration::from_secs(DEFAULT_RETRY_AFTER_SECS),
        }
    }
}

/// reqwest-backed [`AccrualOracle`]
#[derive(Clone)]
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
    default_retry_after: Duration,
}

impl HttpAccrualClient {
    pub fn new(config: HttpAccrualClientConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("loyalty-worker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                LoyaltyError::ConfigurationError(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            base_url = %base_url,
            timeout_ms = config.request_timeout.as_millis() as u64,
            "Created accrual service client"
        );

        Ok(Self {
            client,
            base_url,
            default_retry_after: config.default_retry_after,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, order_number: &str) -> String {
        format!("{}{}{}", self.base_url, ORDER_ENDPOINT_PREFIX, order_number)
    }
}

#[async_trait]
impl AccrualOracle for HttpAccrualClient {
    async fn query(&self, order_number: &str) -> AccrualOutcome {
        let url = self.order_url(order_number);
        debug!(url = %url, order_number = %order_number, "Querying accrual service");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    format!("request failed: {e}")
                };
                warn!(order_number = %order_number, error = %e, "Accrual request failed");
                return AccrualOutcome::transient(reason);
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = if status == StatusCode::OK {
            match response.bytes().await {
                Ok(body) => body.to_vec(),
                Err(e) => {
                    warn!(order_number = %order_number, error = %e, "Failed to read accrual response body");
                    return AccrualOutcome::transient(format!("failed to read body: {e}"));
                }
            }
        } else {
            Vec::new()
        };

        map_response(
            order_number,
            status,
            retry_after.as_deref(),
            &body,
            self.default_retry_after,
        )
    }
}

/// Translate one HTTP exchange into an outcome
pub fn map_response(
    order_number: &str,
    status: StatusCode,
    retry_after: Option<&str>,
    body: &[u8],
    default_retry_after: Duration,
) -> AccrualOutcome {
    match status {
        StatusCode::OK => match serde_json::from_slice::<AccrualResponse>(body) {
            Ok(response) if response.order == order_number => response.into(),
            Ok(response) => AccrualOutcome::transient(format!(
                "response for order {} while querying {}",
                response.order, order_number
            )),
            Err(e) => AccrualOutcome::transient(format!("malformed response body: {e}")),
        },
        StatusCode::NO_CONTENT => AccrualOutcome::NotRegistered,
        StatusCode::TOO_MANY_REQUESTS => AccrualOutcome::RateLimited {
            retry_after: parse_retry_after(retry_after).unwrap_or(default_retry_after),
        },
        other => AccrualOutcome::transient(format!("unexpected status {other}")),
    }
}

/// Positive integer seconds; anything else is ignored
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(LoyaltyError::ConfigurationError(
            "Accrual service address is empty".to_string(),
        ));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    Url::parse(&with_scheme).map_err(|e| {
        LoyaltyError::ConfigurationError(format!("Invalid accrual service address {raw:?}: {e}"))
    })?;

    Ok(with_scheme)
}
