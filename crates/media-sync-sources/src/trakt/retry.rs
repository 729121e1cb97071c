use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TraktError;
use crate::trakt::transport::{ApiRequest, ApiResponse, Transport};

/// Trakt's "account limit exceeded" status, not known to `http`
const ACCOUNT_LIMIT_STATUS: u16 = 420;

/// Suspends the retry loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration) -> Result<(), TraktError>;
}

/// Real timer, aborted early when the run is cancelled.
pub struct TokioSleeper {
    cancel: CancellationToken,
}

impl TokioSleeper {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) -> Result<(), TraktError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TraktError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait used for 429 responses without a usable `Retry-After`
    pub default_retry_after: Duration,
    /// Wait used after a 5xx response
    pub server_error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            default_retry_after: Duration::from_secs(30),
            server_error_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, or `None` when the response is final.
    fn delay_for(&self, response: &ApiResponse) -> Option<Duration> {
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let delay = response
                .header(RETRY_AFTER.as_str())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(self.default_retry_after);
            return Some(delay);
        }
        if response.status.is_server_error() {
            return Some(self.server_error_delay);
        }
        None
    }
}

/// Retries rate-limited and failed-server responses with the same body.
pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(inner: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self::with_policy(inner, sleeper, RetryPolicy::default())
    }

    pub fn with_policy(inner: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self { inner, sleeper, policy }
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, TraktError> {
        for attempt in 1..=self.policy.max_attempts {
            if let Some(body) = request.body.as_mut() {
                body.rewind();
            }

            let response = self.inner.send(request).await?;

            if response.status.as_u16() == ACCOUNT_LIMIT_STATUS {
                warn!(path = %request.path, "Trakt account limit exceeded");
                return Err(TraktError::AccountLimitExceeded);
            }

            let Some(delay) = self.policy.delay_for(&response) else {
                if attempt > 1 {
                    debug!(path = %request.path, attempt, "Request succeeded after retries");
                }
                return Ok(response);
            };

            if attempt == self.policy.max_attempts {
                break;
            }

            debug!(
                path = %request.path,
                status = response.status.as_u16(),
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying Trakt request"
            );
            self.sleeper.sleep(delay).await?;
        }

        warn!(
            path = %request.path,
            attempts = self.policy.max_attempts,
            "Max retries reached"
        );
        Err(TraktError::MaxRetriesReached {
            attempts: self.policy.max_attempts,
        })
    }
}
