//! Scripted collaborators

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatekeep_client::{
    ClientConfig, ClientError, ConfigError, ConfigProvider, PipelineRequest, PipelineResponse,
    TokenRefresher, Transport,
};
use gatekeep_types::TokenPair;
use parking_lot::Mutex;
use serde_json::Value;

/// What the transport saw for one call
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub attempt: u32,
    pub body: Option<Value>,
}

type Handler = dyn Fn(&PipelineRequest, usize) -> Result<PipelineResponse, ClientError> + Send + Sync;

/// Transport answering from a closure, given the request and the 1-based call number
pub struct FakeTransport {
    handler: Box<Handler>,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<SeenRequest>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&PipelineRequest, usize) -> Result<PipelineResponse, ClientError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, handler)
    }

    pub fn with_delay(
        delay: Duration,
        handler: impl Fn(&PipelineRequest, usize) -> Result<PipelineResponse, ClientError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Always answers `status` with `body`
    pub fn fixed(status: u16, body: Value) -> Arc<Self> {
        Self::new(move |_, _| Ok(PipelineResponse::new(status, body.clone())))
    }

    /// 200 only for `Bearer <valid>`, 401 TOKEN_INVALID otherwise
    pub fn requiring_bearer(valid: &'static str) -> Arc<Self> {
        Self::new(move |request, _| {
            if request.bearer_token() == Some(valid) {
                Ok(PipelineResponse::new(200, serde_json::json!({"ok": true})))
            } else {
                Ok(PipelineResponse::new(
                    401,
                    serde_json::json!({"error": {"code": "TOKEN_INVALID", "message": "invalid token"}}),
                ))
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &PipelineRequest) -> Result<PipelineResponse, ClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().push(SeenRequest {
            method: request.method.to_string(),
            url: request.url.to_string(),
            authorization: request.header("authorization").map(str::to_string),
            attempt: request.attempt_count,
            body: request.body.as_json().cloned(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(request, n)
    }
}

/// Refresher issuing `fresh-<n>` tokens, or rejecting every refresh
pub struct CountingRefresher {
    calls: AtomicUsize,
    delay: Duration,
    reject: bool,
}

impl CountingRefresher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(25),
            reject: false,
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.reject {
            return Err(ClientError::RefreshInvalid);
        }
        Ok(super::pair(&format!("fresh-{n}")))
    }
}

/// Provider counting how often configuration is loaded
pub struct CountingConfigProvider {
    config: ClientConfig,
    delay: Duration,
    loads: AtomicUsize,
}

impl CountingConfigProvider {
    pub fn new(config: ClientConfig, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            config,
            delay,
            loads: AtomicUsize::new(0),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigProvider for CountingConfigProvider {
    async fn load(&self) -> Result<ClientConfig, ConfigError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.config.clone())
    }
}
