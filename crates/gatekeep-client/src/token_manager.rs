//! Token storage and deduplicated refresh
//!
//! [`TokenManager`] holds the current [`TokenPair`] and guarantees that at
//! most one refresh is in flight. Every caller that needs a new pair while a
//! refresh is running awaits the same shared future; the slot is cleared
//! when that refresh settles, so the next expiry starts a fresh one.
//!
//! Waiters are bounded by the configured refresh timeout. The refresh itself
//! runs on its own task, so a waiter giving up never cancels it for the
//! others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use gatekeep_types::{AuthResponse, RefreshRequest, TokenPair};
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::metrics;
use crate::request::{PipelineRequest, RequestBody};
use crate::retry::{with_retry, RetryConfig};
use crate::stages::error_mapper::map_error;
use crate::transport::Transport;
use crate::ClientError;

/// Path of the refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "api/auth/refresh";

// =============================================================================
// Token storage
// =============================================================================

/// Secret key/value storage for the token pair.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<TokenPair>, ClientError>;
    async fn save(&self, pair: &TokenPair) -> Result<(), ClientError>;
    async fn clear(&self) -> Result<(), ClientError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `pair`.
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, ClientError> {
        Ok(self.pair.lock().clone())
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), ClientError> {
        *self.pair.lock() = Some(pair.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.pair.lock() = None;
        Ok(())
    }
}

// =============================================================================
// Refreshing
// =============================================================================

/// Exchanges a refresh token for a new pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
}

/// Calls `POST /api/auth/refresh` directly on the transport.
///
/// The call bypasses the pipeline stages so a rejected refresh can never
/// trigger another refresh.
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
    url: Url,
    retry: RetryConfig,
    timeout: Duration,
}

impl HttpTokenRefresher {
    pub fn new(transport: Arc<dyn Transport>, url: Url, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            transport,
            url,
            retry,
            timeout,
        }
    }

    async fn attempt(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;
        let mut request =
            PipelineRequest::new(Method::POST, self.url.clone()).with_body(RequestBody::Json(body));
        request.auth.skip_auth = true;
        request.attempt_count = 1;

        let response = match tokio::time::timeout(self.timeout, self.transport.send(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::timeout("token refresh request timed out")),
        };

        match response.status {
            200..=299 => {
                let auth: AuthResponse = serde_json::from_value(response.body)?;
                Ok(auth.token_pair())
            }
            400 | 401 => Err(ClientError::RefreshInvalid),
            status => Err(map_error(ClientError::from_response(status, &response.body))),
        }
    }
}

impl std::fmt::Debug for HttpTokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenRefresher")
            .field("url", &self.url.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        with_retry(self.retry.clone(), || self.attempt(refresh_token)).await
    }
}

// =============================================================================
// Token manager
// =============================================================================

type RefreshFuture = Shared<BoxFuture<'static, Result<TokenPair, ClientError>>>;

struct Inner {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    current: RwLock<Option<TokenPair>>,
    in_flight: Mutex<Option<RefreshFuture>>,
    refresh_timeout: Duration,
    refresh_count: AtomicU64,
}

/// Current token pair plus the single shared refresh slot.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("current", &*self.inner.current.read())
            .field("refreshing", &self.inner.in_flight.lock().is_some())
            .field("refresh_count", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                current: RwLock::new(None),
                in_flight: Mutex::new(None),
                refresh_timeout,
                refresh_count: AtomicU64::new(0),
            }),
        }
    }

    /// Load the persisted pair, if any.
    pub async fn load(&self) -> Result<Option<TokenPair>, ClientError> {
        let pair = self.inner.store.load().await?;
        *self.inner.current.write() = pair.clone();
        Ok(pair)
    }

    pub fn current(&self) -> Option<TokenPair> {
        self.inner.current.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .current
            .read()
            .as_ref()
            .map(|p| p.access_token.clone())
    }

    /// Replace the pair after login, registration or an external refresh.
    pub async fn set(&self, pair: TokenPair) -> Result<(), ClientError> {
        self.inner.store.save(&pair).await?;
        *self.inner.current.write() = Some(pair);
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        *self.inner.current.write() = None;
        self.inner.store.clear().await
    }

    /// Refreshes completed successfully since creation.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::SeqCst)
    }

    /// Obtain a pair newer than `stale_access`.
    ///
    /// If the current pair already differs from the token that failed and
    /// is still valid, it is returned without refreshing. Otherwise the
    /// caller joins the in-flight refresh or starts one.
    #[instrument(skip_all, level = "debug")]
    pub async fn refresh(&self, stale_access: Option<&str>) -> Result<TokenPair, ClientError> {
        if let (Some(stale), Some(pair)) = (stale_access, self.current()) {
            if pair.access_token != stale && !pair.is_access_expired() {
                debug!("token already rotated by a concurrent refresh");
                return Ok(pair);
            }
        }

        let shared = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(inner.run_refresh());
                    let future: BoxFuture<'static, Result<TokenPair, ClientError>> = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(ClientError::network(format!("token refresh task failed: {e}")))
                        })
                    }
                    .boxed();
                    let shared = future.shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        match tokio::time::timeout(self.inner.refresh_timeout, shared).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.inner.refresh_timeout.as_millis(), "gave up waiting for token refresh");
                Err(ClientError::timeout("token refresh timed out"))
            }
        }
    }
}

impl Inner {
    async fn run_refresh(self: Arc<Self>) -> Result<TokenPair, ClientError> {
        let result = self.refresh_once().await;
        // The pair is updated before the slot opens so late callers see it.
        *self.in_flight.lock() = None;
        result
    }

    async fn refresh_once(&self) -> Result<TokenPair, ClientError> {
        let current = self.current.read().clone();
        let Some(current) = current else {
            return Err(ClientError::TokenMissing);
        };
        if current.is_refresh_expired() {
            info!("refresh token expired, clearing session");
            self.forget().await;
            metrics::record_token_refresh("invalid");
            return Err(ClientError::RefreshInvalid);
        }

        match self.refresher.refresh(&current.refresh_token).await {
            Ok(pair) => {
                if let Err(err) = self.store.save(&pair).await {
                    warn!(error = %err, "failed to persist refreshed tokens");
                }
                *self.current.write() = Some(pair.clone());
                self.refresh_count.fetch_add(1, Ordering::SeqCst);
                metrics::record_token_refresh("success");
                info!(user_id = %pair.user_id, "access token refreshed");
                Ok(pair)
            }
            Err(err @ (ClientError::RefreshInvalid | ClientError::TokenInvalid)) => {
                info!("refresh token rejected, clearing session");
                self.forget().await;
                metrics::record_token_refresh("invalid");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                metrics::record_token_refresh("error");
                Err(err)
            }
        }
    }

    async fn forget(&self) {
        *self.current.write() = None;
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear stored tokens");
        }
    }
}
