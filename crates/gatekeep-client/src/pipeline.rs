//! Middleware pipeline
//!
//! A [`Pipeline`] owns an ordered list of [`Stage`]s and a [`Transport`].
//! Every call runs three phases:
//!
//! 1. **Request**: stages in registration order may rewrite the request,
//!    fail it, or short-circuit it with a response (cache hits).
//! 2. **Transport**: the request is sent under a per-call deadline. Any
//!    non-2xx status becomes a raw [`ClientError::Http`].
//! 3. **Response / error**: stages run in the configured phase order. An
//!    error handler can replace the error, recover with a response, or ask
//!    for a replay, which re-enters the transport with the same request.
//!
//! After the error phase the terminal mapper turns raw HTTP errors into the
//! typed [`ClientError`] taxonomy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::DEFAULT_STAGE_ORDER;
use crate::metrics::{Outcome, RequestTimer};
use crate::request::{PipelineRequest, PipelineResponse, RequestState};
use crate::stages::error_mapper::map_error;
use crate::transport::Transport;
use crate::ClientError;

/// Upper bound on transport attempts for one request, whatever the stages ask.
pub const MAX_ATTEMPTS: u32 = 32;

/// Result of a request-phase hook.
#[derive(Debug)]
pub enum StageOutcome {
    Continue,
    /// Skip the transport and the remaining request stages.
    ShortCircuit(PipelineResponse),
}

/// Result of an error-phase hook.
#[derive(Debug)]
pub enum ErrorOutcome {
    /// Hand the error to the next stage unchanged.
    Propagate,
    /// Hand a different error to the next stage.
    Replace(ClientError),
    /// Send the request again.
    Replay,
    /// Answer the call with this response instead.
    Recovered(PipelineResponse),
}

/// One pipeline stage. Every hook defaults to pass-through.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used by the phase order.
    fn name(&self) -> &'static str;

    async fn on_request(&self, _request: &mut PipelineRequest) -> Result<StageOutcome, ClientError> {
        Ok(StageOutcome::Continue)
    }

    async fn on_response(&self, _request: &PipelineRequest, _response: &mut PipelineResponse) {}

    async fn on_error(&self, _request: &mut PipelineRequest, _error: &ClientError) -> ErrorOutcome {
        ErrorOutcome::Propagate
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    stages: Vec<Arc<dyn Stage>>,
    order: Vec<String>,
    request_timeout: Duration,
}

impl PipelineBuilder {
    /// Register a stage. Registration order is the request-phase order.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Response/error phase order by stage name.
    ///
    /// Registered stages missing from the list run afterwards in
    /// registration order.
    #[must_use]
    pub fn response_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Default deadline for one transport call.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Pipeline {
        let mut remaining: Vec<Option<Arc<dyn Stage>>> =
            self.stages.iter().cloned().map(Some).collect();
        let mut response_order = Vec::with_capacity(self.stages.len());

        for name in &self.order {
            let found = remaining
                .iter_mut()
                .find(|slot| matches!(slot, Some(s) if s.name() == name.as_str()));
            match found.and_then(Option::take) {
                Some(stage) => response_order.push(stage),
                None => debug!(stage = %name, "phase order names an unregistered stage"),
            }
        }
        response_order.extend(remaining.into_iter().flatten());

        Pipeline {
            transport: self.transport,
            request_order: self.stages,
            response_order,
            request_timeout: self.request_timeout,
        }
    }
}

/// Ordered stages around a transport.
#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    request_order: Vec<Arc<dyn Stage>>,
    response_order: Vec<Arc<dyn Stage>>,
    request_timeout: Duration,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_order", &self.request_stage_names())
            .field("response_order", &self.response_stage_names())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

enum ErrorFlow {
    Replay(ClientError),
    Recovered(PipelineResponse),
    Fail(ClientError),
}

impl Pipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder {
            transport,
            stages: Vec::new(),
            order: DEFAULT_STAGE_ORDER.iter().map(|s| s.to_string()).collect(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn request_stage_names(&self) -> Vec<&'static str> {
        self.request_order.iter().map(|s| s.name()).collect()
    }

    pub fn response_stage_names(&self) -> Vec<&'static str> {
        self.response_order.iter().map(|s| s.name()).collect()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run one logical request through every phase.
    pub async fn execute(&self, mut request: PipelineRequest) -> Result<PipelineResponse, ClientError> {
        let timer = RequestTimer::start(request.method.as_str());

        for stage in &self.request_order {
            match stage.on_request(&mut request).await {
                Ok(StageOutcome::Continue) => {}
                Ok(StageOutcome::ShortCircuit(mut response)) => {
                    debug!(request_id = %request.id, stage = stage.name(), "request short-circuited");
                    self.respond(&request, &mut response).await;
                    request.transition(RequestState::Ok);
                    timer.finish(Outcome::Success);
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        request_id = %request.id,
                        stage = stage.name(),
                        error = %err,
                        "request rejected before sending"
                    );
                    request.transition(RequestState::Failed);
                    timer.finish(Outcome::Error);
                    return Err(map_error(err));
                }
            }
        }

        loop {
            let error = match self.send(&mut request).await {
                Ok(mut response) => {
                    self.respond(&request, &mut response).await;
                    request.transition(RequestState::Ok);
                    timer.finish(Outcome::Success);
                    return Ok(response);
                }
                Err(error) => error,
            };

            if error.is_timeout() {
                request.transition(RequestState::TimedOut);
            }

            match self.handle_error(&mut request, error).await {
                ErrorFlow::Replay(last) if request.attempt_count >= MAX_ATTEMPTS => {
                    warn!(request_id = %request.id, attempts = request.attempt_count, "attempt ceiling reached");
                    return Err(self.fail(&mut request, map_error(last), timer));
                }
                ErrorFlow::Replay(_) => continue,
                ErrorFlow::Recovered(mut response) => {
                    self.respond(&request, &mut response).await;
                    request.transition(RequestState::Ok);
                    timer.finish(Outcome::Success);
                    return Ok(response);
                }
                ErrorFlow::Fail(err) => return Err(self.fail(&mut request, err, timer)),
            }
        }
    }

    async fn send(&self, request: &mut PipelineRequest) -> Result<PipelineResponse, ClientError> {
        request.attempt_count += 1;
        request.transition(RequestState::Sent);

        let deadline = request.timeout.unwrap_or(self.request_timeout);
        let response = match tokio::time::timeout(deadline, self.transport.send(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::timeout(format!(
                    "{} {} timed out after {deadline:?}",
                    request.method, request.url
                )))
            }
        };

        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::from_response(response.status, &response.body))
        }
    }

    async fn respond(&self, request: &PipelineRequest, response: &mut PipelineResponse) {
        for stage in &self.response_order {
            stage.on_response(request, response).await;
        }
    }

    async fn handle_error(&self, request: &mut PipelineRequest, mut error: ClientError) -> ErrorFlow {
        for stage in &self.response_order {
            match stage.on_error(request, &error).await {
                ErrorOutcome::Propagate => {}
                ErrorOutcome::Replace(next) => error = next,
                ErrorOutcome::Replay => return ErrorFlow::Replay(error),
                ErrorOutcome::Recovered(response) => return ErrorFlow::Recovered(response),
            }
        }
        ErrorFlow::Fail(map_error(error))
    }

    fn fail(&self, request: &mut PipelineRequest, error: ClientError, timer: RequestTimer) -> ClientError {
        request.transition(RequestState::Failed);
        let outcome = if error.is_timeout() {
            Outcome::Timeout
        } else {
            Outcome::Error
        };
        timer.finish(outcome);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use parking_lot::Mutex;
    use reqwest::Method;
    use serde_json::json;
    use url::Url;

    struct Fixed(u16);

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _request: &PipelineRequest) -> Result<PipelineResponse, ClientError> {
            Ok(PipelineResponse::new(self.0, json!({"ok": self.0 < 300})))
        }
    }

    struct Named(&'static str);

    #[async_trait]
    impl Stage for Named {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn on_request(&self, _request: &mut PipelineRequest) -> Result<StageOutcome, ClientError> {
            self.log.lock().push(format!("req:{}", self.name));
            Ok(StageOutcome::Continue)
        }

        async fn on_response(&self, _request: &PipelineRequest, _response: &mut PipelineResponse) {
            self.log.lock().push(format!("res:{}", self.name));
        }

        async fn on_error(&self, _request: &mut PipelineRequest, _error: &ClientError) -> ErrorOutcome {
            self.log.lock().push(format!("err:{}", self.name));
            ErrorOutcome::Propagate
        }
    }

    fn request() -> PipelineRequest {
        PipelineRequest::new(Method::GET, Url::parse("http://api.local/x").unwrap())
    }

    #[test]
    fn test_response_order_resolution() {
        let pipeline = Pipeline::builder(Arc::new(Fixed(200)))
            .stage(Arc::new(Named("auth")))
            .stage(Arc::new(Named("custom")))
            .stage(Arc::new(Named("retry")))
            .stage(Arc::new(Named("logging")))
            .response_order(["logging", "retry", "missing"])
            .build();

        assert_eq!(pipeline.request_stage_names(), ["auth", "custom", "retry", "logging"]);
        assert_eq!(pipeline.response_stage_names(), ["logging", "retry", "auth", "custom"]);
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder(Arc::new(Fixed(200)))
            .stage(Arc::new(Recorder { name: "a", log: log.clone() }))
            .stage(Arc::new(Recorder { name: "b", log: log.clone() }))
            .response_order(["b", "a"])
            .build();

        let response = pipeline.execute(request()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(*log.lock(), ["req:a", "req:b", "res:b", "res:a"]);
    }

    #[tokio::test]
    async fn test_error_phase_then_mapping() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder(Arc::new(Fixed(404)))
            .stage(Arc::new(Recorder { name: "a", log: log.clone() }))
            .build();

        let err = pipeline.execute(request()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(*log.lock(), ["req:a", "err:a"]);
    }

    struct AlwaysReplay;

    #[async_trait]
    impl Stage for AlwaysReplay {
        fn name(&self) -> &'static str {
            "replay"
        }

        async fn on_error(&self, _request: &mut PipelineRequest, _error: &ClientError) -> ErrorOutcome {
            ErrorOutcome::Replay
        }
    }

    #[tokio::test]
    async fn test_replays_are_capped() {
        let pipeline = Pipeline::builder(Arc::new(Fixed(503)))
            .stage(Arc::new(AlwaysReplay))
            .build();

        let err = pipeline.execute(request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 503, .. }));
    }
}
