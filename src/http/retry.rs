use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Auth, HttpRequest, Method, Transport, TransportError};
use crate::error::{Error, Result};

/// Why an attempt is being retried. Each cause has its own backoff floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    Network,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub network_backoff: Duration,
    pub unavailable_backoff: Duration,
    /// 1.0 keeps the delay fixed at the floor.
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Total attempts per request. `None` retries until success or cancellation.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_backoff: Duration::from_millis(500),
            unavailable_backoff: Duration::from_secs(60),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(600),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay(&self, cause: RetryCause, attempt: u32) -> Duration {
        let floor = match cause {
            RetryCause::Network => self.network_backoff,
            RetryCause::Unavailable => self.unavailable_backoff,
        };
        let cap = self.max_delay.max(floor);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = floor.as_secs_f64() * self.backoff_multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(cap).min(cap)
    }

    fn allows_retry_after(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A single logical call with auth injection and retry on network errors and 503s.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    auth: Auth,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, auth: Auth, policy: RetryPolicy) -> Self {
        Self {
            transport,
            auth,
            policy,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let request = HttpRequest {
                method: method.clone(),
                url: url.to_string(),
                headers: self.auth.headers(),
                body: body.cloned(),
            };

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(url)),
                sent = self.transport.send(request) => sent,
            };

            let (cause, last) = match sent {
                Ok(resp) if resp.is_success() => {
                    tracing::info!(%url, status = resp.status, attempt, "request succeeded");
                    return serde_json::from_str(&resp.body).map_err(|source| Error::Decode {
                        url: url.to_string(),
                        source,
                    });
                }
                Ok(resp) if resp.status == 503 => {
                    tracing::error!(%url, status = resp.status, attempt, "service unavailable");
                    (RetryCause::Unavailable, format!("HTTP 503: {}", resp.body))
                }
                Ok(resp) => {
                    tracing::error!(%url, status = resp.status, attempt, "request failed");
                    return Err(Error::Http {
                        status: resp.status,
                        url: url.to_string(),
                        body: resp.body,
                    });
                }
                Err(TransportError::Network(msg)) => {
                    tracing::error!(%url, error = %msg, attempt, "network error");
                    (RetryCause::Network, msg)
                }
                Err(TransportError::Request(message)) => {
                    tracing::error!(%url, error = %message, attempt, "request rejected");
                    return Err(Error::Request {
                        url: url.to_string(),
                        message,
                    });
                }
            };

            if !self.policy.allows_retry_after(attempt) {
                tracing::error!(%url, attempts = attempt, "retry limit reached");
                return Err(Error::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last,
                });
            }

            let delay = self.policy.delay(cause, attempt);
            tracing::warn!(
                %url,
                attempt,
                cause = ?cause,
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(url)),
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    fn cancelled(&self, url: &str) -> Error {
        tracing::warn!(%url, "request cancelled");
        Error::Cancelled {
            url: url.to_string(),
        }
    }
}
