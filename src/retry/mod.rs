//! Timeout and bounded exponential backoff for calls to external services.
//!
//! All HTTP traffic in the crate goes through blocking `ureq` requests. Each
//! attempt runs on the blocking pool and is awaited under a timeout; when the
//! timeout fires the attempt is abandoned and whatever it eventually returns
//! is discarded.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::RetryConfig;

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Worth retrying: transport failures, 5xx and 429 responses
    #[error("transient failure: {0}")]
    Transient(String),
    /// Retrying cannot help: 4xx responses, malformed requests
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl CallError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

impl From<ureq::Error> for CallError {
    #[inline]
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) if status >= 500 || status == 429 => {
                Self::Transient(format!("HTTP {status}"))
            }
            ureq::Error::StatusCode(status) => Self::Permanent(format!("HTTP {status}")),
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => Self::Transient(error.to_string()),
            other => Self::Permanent(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[inline]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    #[inline]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds, fails permanently or the attempts
    /// run out. Returns the last error on exhaustion.
    #[inline]
    pub async fn call<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = CallError::Transient("no attempt made".to_string());

        for attempt in 1..=attempts {
            debug!("{} attempt {}/{}", operation, attempt, attempts);

            let outcome = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(CallError::TimedOut(self.timeout)),
            };

            match outcome {
                Ok(value) => {
                    debug!("{} succeeded on attempt {}", operation, attempt);
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    warn!("{} failed permanently: {}", operation, err);
                    return Err(err);
                }
                Err(err) => {
                    warn!("{} attempt {}/{} failed: {}", operation, attempt, attempts, err);
                    last_error = err;
                    if attempt < attempts {
                        let delay = self.backoff_for(attempt);
                        debug!("Waiting {:?} before retry", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!("{} failed after {} attempts", operation, attempts);
        Err(last_error)
    }

    /// Like [`RetryPolicy::call`], for a blocking HTTP request. The request
    /// closure runs on the blocking thread pool once per attempt.
    #[inline]
    pub async fn call_blocking<T, F>(&self, operation: &str, request: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, ureq::Error> + Send + Sync + 'static,
    {
        let request = Arc::new(request);
        self.call(operation, || {
            let request = Arc::clone(&request);
            async move {
                match tokio::task::spawn_blocking(move || request()).await {
                    Ok(result) => result.map_err(CallError::from),
                    Err(join_error) => Err(CallError::Permanent(format!(
                        "request task failed: {join_error}"
                    ))),
                }
            }
        })
        .await
    }
}
