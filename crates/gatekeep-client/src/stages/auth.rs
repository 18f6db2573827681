//! Bearer token stage
//!
//! Attaches the current access token and recovers from one 401 per request
//! by refreshing through the shared [`TokenManager`] slot and replaying.

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::{ErrorOutcome, Stage, StageOutcome};
use crate::request::{PipelineRequest, RequestState};
use crate::token_manager::TokenManager;
use crate::ClientError;

#[derive(Debug, Clone)]
pub struct AuthStage {
    tokens: TokenManager,
}

impl AuthStage {
    pub fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }

    fn attach(request: &mut PipelineRequest, access_token: &str) {
        request.set_header("authorization", format!("Bearer {access_token}"));
    }
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn on_request(&self, request: &mut PipelineRequest) -> Result<StageOutcome, ClientError> {
        if request.auth.skip_auth {
            return Ok(StageOutcome::Continue);
        }

        let mut pair = self.tokens.current();
        if let Some(expired) = pair.as_ref().filter(|p| p.is_access_expired()) {
            debug!(request_id = %request.id, "access token expired locally, refreshing first");
            request.transition(RequestState::Refreshing);
            let stale = expired.access_token.clone();
            pair = match self.tokens.refresh(Some(&stale)).await {
                Ok(fresh) => Some(fresh),
                Err(err) if request.auth.requires_auth => return Err(err),
                Err(err) => {
                    debug!(request_id = %request.id, error = %err, "sending without credentials");
                    None
                }
            };
        }

        match pair {
            Some(pair) => Self::attach(request, &pair.access_token),
            None if request.auth.requires_auth => return Err(ClientError::TokenMissing),
            None => {}
        }
        Ok(StageOutcome::Continue)
    }

    async fn on_error(&self, request: &mut PipelineRequest, error: &ClientError) -> ErrorOutcome {
        if request.auth.skip_auth || !matches!(error, ClientError::Http { status: 401, .. }) {
            return ErrorOutcome::Propagate;
        }
        if request.auth_refreshed {
            debug!(request_id = %request.id, "401 after refresh, giving up");
            return ErrorOutcome::Replace(ClientError::TokenInvalid);
        }
        if self.tokens.current().is_none() {
            return ErrorOutcome::Propagate;
        }

        request.auth_refreshed = true;
        request.transition(RequestState::NeedsRefresh);
        request.transition(RequestState::Refreshing);

        let stale = request.bearer_token().map(str::to_string);
        match self.tokens.refresh(stale.as_deref()).await {
            Ok(pair) => {
                Self::attach(request, &pair.access_token);
                request.transition(RequestState::Replayed);
                debug!(request_id = %request.id, "replaying with refreshed token");
                ErrorOutcome::Replay
            }
            Err(err) => ErrorOutcome::Replace(err),
        }
    }
}
