//! Retry stage with bounded backoff
//!
//! Replays requests that failed with a transient error: network failures
//! (timeouts included), 5xx and 429. Everything else surfaces immediately.
//! Once `attempt_count > max_retries` the last error wins.
//!
//! ```ignore
//! use gatekeep_client::retry::{Backoff, RetryConfig};
//!
//! let retry = RetryConfig {
//!     max_retries: 2,
//!     retry_delay: Duration::from_millis(100),
//!     backoff: Backoff::Linear,
//!     ..RetryConfig::default()
//! };
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::metrics;
use crate::pipeline::{ErrorOutcome, Stage};
use crate::request::{PipelineRequest, RequestState, RetryDirective};
use crate::ClientError;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Always `retry_delay`
    #[default]
    Fixed,
    /// `retry_delay * attempt`
    Linear,
    /// `retry_delay * 2^(attempt - 1)`
    Exponential,
}

impl Backoff {
    fn multiplier(self, attempt: u32) -> u32 {
        match self {
            Self::Fixed => 1,
            Self::Linear => attempt,
            Self::Exponential => 2u32.saturating_pow(attempt - 1),
        }
    }
}

/// Client-wide retry defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Replays allowed after the first attempt
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::from_millis(1000),
            backoff: Backoff::Fixed,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before replay number `attempt` (1-indexed)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff.multiplier(attempt.max(1));
        self.retry_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// These defaults with a per-request directive laid over them
    #[must_use]
    pub fn overridden_by(&self, directive: Option<&RetryDirective>) -> Self {
        let mut config = self.clone();
        if let Some(directive) = directive {
            config.max_retries = directive.max_retries.unwrap_or(config.max_retries);
            config.retry_delay = directive.retry_delay.unwrap_or(config.retry_delay);
            config.backoff = directive.backoff.unwrap_or(config.backoff);
        }
        config
    }
}

/// Decides whether a failed attempt is replayed.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the next attempt, or `None` when `error` is final
    /// after `attempts` tries.
    #[must_use]
    pub fn next_delay(&self, attempts: u32, error: &ClientError) -> Option<Duration> {
        (error.is_retryable() && attempts <= self.config.max_retries)
            .then(|| self.config.delay_for(attempts))
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

/// Run `operation` until it succeeds or fails for good.
///
/// Used outside the pipeline, e.g. by the token refresher.
pub async fn with_retry<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let policy = RetryPolicy::new(config);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(delay) = policy.next_delay(attempts, &err) else {
            return Err(err);
        };

        warn!(
            attempt = attempts,
            max_retries = policy.max_retries(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying operation"
        );
        sleep(delay).await;
    }
}

/// Pipeline stage that replays transient failures.
#[derive(Debug, Clone, Default)]
pub struct RetryStage {
    defaults: RetryConfig,
}

impl RetryStage {
    pub fn new(defaults: RetryConfig) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl Stage for RetryStage {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn on_error(&self, request: &mut PipelineRequest, error: &ClientError) -> ErrorOutcome {
        let policy = RetryPolicy::new(self.defaults.overridden_by(request.retry.as_ref()));
        let Some(delay) = policy.next_delay(request.attempt_count, error) else {
            return ErrorOutcome::Propagate;
        };

        warn!(
            request_id = %request.id,
            method = %request.method,
            attempt = request.attempt_count,
            max_retries = policy.max_retries(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying request"
        );
        metrics::record_retry(request.method.as_str(), request.attempt_count);

        request.transition(RequestState::Retrying);
        sleep(delay).await;
        ErrorOutcome::Replay
    }
}
