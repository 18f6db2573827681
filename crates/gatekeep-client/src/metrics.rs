//! Pipeline metrics
//!
//! | name | kind | labels |
//! |---|---|---|
//! | `gatekeep_client_requests_total` | counter | method, outcome |
//! | `gatekeep_client_request_duration_seconds` | histogram | method |
//! | `gatekeep_client_retries_total` | counter | method, attempt |
//! | `gatekeep_client_cache_lookups_total` | counter | result |
//! | `gatekeep_client_token_refreshes_total` | counter | outcome |
//!
//! Recording is a no-op until the application installs a `metrics` recorder.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use tokio::time::Instant;

pub const REQUESTS_TOTAL: &str = "gatekeep_client_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "gatekeep_client_request_duration_seconds";
pub const RETRIES_TOTAL: &str = "gatekeep_client_retries_total";
pub const CACHE_LOOKUPS_TOTAL: &str = "gatekeep_client_cache_lookups_total";
pub const TOKEN_REFRESHES_TOTAL: &str = "gatekeep_client_token_refreshes_total";

/// How a logical request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    Timeout,
    /// The caller dropped the request future
    Cancelled,
}

impl Outcome {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

pub fn record_request(method: &str, outcome: Outcome, elapsed: Duration) {
    counter!(REQUESTS_TOTAL, "method" => method.to_owned(), "outcome" => outcome.label())
        .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_owned())
        .record(elapsed.as_secs_f64());
}

/// `attempt` is the attempt that just failed
pub fn record_retry(method: &str, attempt: u32) {
    counter!(RETRIES_TOTAL, "method" => method.to_owned(), "attempt" => attempt.to_string())
        .increment(1);
}

pub fn record_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// `outcome` is one of "success", "invalid", "error"
pub fn record_token_refresh(outcome: &'static str) {
    counter!(TOKEN_REFRESHES_TOTAL, "outcome" => outcome).increment(1);
}

/// Measures one logical request, replays included.
///
/// Dropping it unfinished counts the request as cancelled.
#[must_use]
pub struct RequestTimer {
    method: String,
    started: Instant,
    done: bool,
}

impl RequestTimer {
    pub fn start(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            started: Instant::now(),
            done: false,
        }
    }

    pub fn finish(mut self, outcome: Outcome) -> Duration {
        self.done = true;
        let elapsed = self.started.elapsed();
        record_request(&self.method, outcome, elapsed);
        elapsed
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !self.done {
            record_request(&self.method, Outcome::Cancelled, self.started.elapsed());
        }
    }
}

/// Register descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "Logical requests by method and outcome");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "End-to-end request duration, replays included"
    );
    describe_counter!(RETRIES_TOTAL, Unit::Count, "Replays scheduled by the retry stage");
    describe_counter!(CACHE_LOOKUPS_TOTAL, Unit::Count, "Response cache lookups by result");
    describe_counter!(TOKEN_REFRESHES_TOTAL, Unit::Count, "Shared token refreshes by outcome");
}
