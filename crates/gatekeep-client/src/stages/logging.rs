//! Request logging stage
//!
//! Logs method, URL, status, attempt and latency. Header values and bodies
//! are never logged.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::pipeline::{ErrorOutcome, Stage, StageOutcome};
use crate::request::{PipelineRequest, PipelineResponse};
use crate::ClientError;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStage;

impl LoggingStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn on_request(&self, request: &mut PipelineRequest) -> Result<StageOutcome, ClientError> {
        debug!(
            request_id = %request.id,
            method = %request.method,
            url = %request.url,
            headers = ?request.headers.keys().collect::<Vec<_>>(),
            "sending request"
        );
        Ok(StageOutcome::Continue)
    }

    async fn on_response(&self, request: &PipelineRequest, response: &mut PipelineResponse) {
        info!(
            request_id = %request.id,
            method = %request.method,
            url = %request.url,
            status = response.status,
            attempts = request.attempt_count,
            from_cache = response.from_cache,
            elapsed_ms = request.started_at.elapsed().as_millis() as u64,
            "request completed"
        );
    }

    async fn on_error(&self, request: &mut PipelineRequest, error: &ClientError) -> ErrorOutcome {
        warn!(
            request_id = %request.id,
            method = %request.method,
            url = %request.url,
            status = error.status(),
            attempt = request.attempt_count,
            elapsed_ms = request.started_at.elapsed().as_millis() as u64,
            error = %error,
            "request failed"
        );
        ErrorOutcome::Propagate
    }
}
