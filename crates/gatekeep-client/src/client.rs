//! HTTP client façade
//!
//! [`HttpClient`] is constructed explicitly and shared by cloning. Nothing
//! touches the network or the configuration source until the first call
//! (or an explicit [`HttpClient::initialize`]); initialization then runs
//! exactly once, bounded by the init timeout.
//!
//! ```ignore
//! use gatekeep_client::{HttpClient, RequestOptions};
//!
//! let client = HttpClient::builder().build();
//! client.login("ada@example.com", "correct-horse-battery").await?;
//!
//! let me = client.current_user().await?;
//! let items: Vec<Item> = client
//!     .get("/api/items", RequestOptions::new().cached(Duration::from_secs(30)))
//!     .await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gatekeep_types::{AuthResponse, LoginRequest, RegisterRequest, TokenPair, UserProfile};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::cache::{CacheStage, ResponseCache};
use crate::config::{ClientConfig, ConfigError, ConfigProvider, EnvConfigProvider, StaticConfigProvider};
use crate::pipeline::{Pipeline, Stage};
use crate::request::{PipelineRequest, PipelineResponse, RequestBody, RequestOptions, Upload};
use crate::retry::RetryStage;
use crate::stages::{AuthStage, LoggingStage};
use crate::token_manager::{
    HttpTokenRefresher, MemoryTokenStore, TokenManager, TokenRefresher, TokenStore, REFRESH_PATH,
};
use crate::transport::{ReqwestTransport, Transport};
use crate::{ClientError, Result};

/// Default bound on initialization.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

const LOGIN_PATH: &str = "api/auth/login";
const REGISTER_PATH: &str = "api/auth/register";
const ME_PATH: &str = "api/auth/me";

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    provider: Arc<dyn ConfigProvider>,
    transport: Option<Arc<dyn Transport>>,
    token_store: Arc<dyn TokenStore>,
    token_refresher: Option<Arc<dyn TokenRefresher>>,
    init_timeout: Duration,
    extra_stages: Vec<Arc<dyn Stage>>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            provider: Arc::new(EnvConfigProvider::new()),
            transport: None,
            token_store: Arc::new(MemoryTokenStore::new()),
            token_refresher: None,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            extra_stages: Vec::new(),
        }
    }
}

impl HttpClientBuilder {
    /// Use a fixed configuration instead of the environment.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.init_timeout = config.init_timeout();
        self.provider = Arc::new(StaticConfigProvider(config));
        self
    }

    #[must_use]
    pub fn config_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Replace the `reqwest` transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = store;
        self
    }

    /// Replace the HTTP refresh call.
    #[must_use]
    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.token_refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Register an application stage after the built-in ones.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.extra_stages.push(stage);
        self
    }

    pub fn build(self) -> HttpClient {
        HttpClient {
            inner: Arc::new(ClientInner {
                provider: self.provider,
                transport: self.transport,
                token_store: self.token_store,
                token_refresher: self.token_refresher,
                init_timeout: self.init_timeout,
                extra_stages: self.extra_stages,
                runtime: OnceCell::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

/// Everything built during initialization.
struct Runtime {
    config: ClientConfig,
    pipeline: Pipeline,
    cache: ResponseCache,
    tokens: TokenManager,
}

struct ClientInner {
    provider: Arc<dyn ConfigProvider>,
    transport: Option<Arc<dyn Transport>>,
    token_store: Arc<dyn TokenStore>,
    token_refresher: Option<Arc<dyn TokenRefresher>>,
    init_timeout: Duration,
    extra_stages: Vec<Arc<dyn Stage>>,
    runtime: OnceCell<Runtime>,
    closed: AtomicBool,
}

impl ClientInner {
    async fn init(&self) -> Result<Runtime> {
        let config = self.provider.load().await?;

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(ReqwestTransport::new(&config)?),
        };
        let refresher: Arc<dyn TokenRefresher> = match &self.token_refresher {
            Some(refresher) => Arc::clone(refresher),
            None => Arc::new(HttpTokenRefresher::new(
                Arc::clone(&transport),
                config.resolve(REFRESH_PATH)?,
                config.retry().clone(),
                config.request_timeout(),
            )),
        };

        let tokens = TokenManager::new(
            Arc::clone(&self.token_store),
            refresher,
            config.refresh_timeout(),
        );
        tokens.load().await?;

        let cache = ResponseCache::new(config.cache_capacity());
        let mut builder = Pipeline::builder(transport)
            .request_timeout(config.request_timeout())
            .response_order(config.stage_order().to_vec())
            .stage(Arc::new(LoggingStage::new()))
            .stage(Arc::new(CacheStage::new(cache.clone())))
            .stage(Arc::new(AuthStage::new(tokens.clone())))
            .stage(Arc::new(RetryStage::new(config.retry().clone())));
        for stage in &self.extra_stages {
            builder = builder.stage(Arc::clone(stage));
        }
        let pipeline = builder.build();

        info!(
            base_url = %config.base_url(),
            stages = ?pipeline.response_stage_names(),
            "gatekeep client initialized"
        );

        Ok(Runtime {
            config,
            pipeline,
            cache,
            tokens,
        })
    }
}

/// Authenticated HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("initialized", &self.is_initialized())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Client configured with `config` and default collaborators.
    pub fn new(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load configuration and stored tokens. Idempotent.
    ///
    /// Concurrent callers share one initialization. A failed or timed-out
    /// attempt leaves the client uninitialized so a later call can retry.
    pub async fn initialize(&self) -> Result<()> {
        self.runtime().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.runtime.initialized()
    }

    /// Stop accepting calls. Cached responses are dropped; stored tokens
    /// are kept for the next client.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(runtime) = self.inner.runtime.get() {
            runtime.cache.clear(None).await;
        }
        info!("gatekeep client shut down");
    }

    async fn runtime(&self) -> Result<&Runtime> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        let timeout = self.inner.init_timeout;
        self.inner
            .runtime
            .get_or_try_init(|| async {
                match tokio::time::timeout(timeout, self.inner.init()).await {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::Config(ConfigError::InitTimeout(timeout))),
                }
            })
            .await
    }

    /// Effective configuration.
    pub async fn config(&self) -> Result<ClientConfig> {
        Ok(self.runtime().await?.config.clone())
    }

    /// The assembled pipeline, for inspection and custom calls.
    pub async fn pipeline(&self) -> Result<Pipeline> {
        Ok(self.runtime().await?.pipeline.clone())
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        let response = self.request_raw(Method::GET, path, RequestBody::Empty, options).await?;
        decode(response)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = RequestBody::Json(serde_json::to_value(body)?);
        let response = self.request_raw(Method::POST, path, body, options).await?;
        decode(response)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = RequestBody::Json(serde_json::to_value(body)?);
        let response = self.request_raw(Method::PUT, path, body, options).await?;
        decode(response)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        let response = self
            .request_raw(Method::DELETE, path, RequestBody::Empty, options)
            .await?;
        decode(response)
    }

    /// Send `upload` as `multipart/form-data`.
    pub async fn upload_file<T: DeserializeOwned>(
        &self,
        path: &str,
        upload: Upload,
        options: RequestOptions,
    ) -> Result<T> {
        let response = self
            .request_raw(Method::POST, path, RequestBody::Multipart(upload), options)
            .await?;
        decode(response)
    }

    /// Run a request through the pipeline without decoding the body.
    #[instrument(skip(self, method, body, options), fields(method = %method), level = "debug")]
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<PipelineResponse> {
        let runtime = self.runtime().await?;
        let url = runtime.config.resolve(path)?;
        let request = PipelineRequest::new(method, url)
            .with_body(body)
            .with_options(options);
        runtime.pipeline.execute(request).await
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Log in and store the issued pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self
            .post(LOGIN_PATH, &body, RequestOptions::new().skip_auth())
            .await?;
        self.replace_session(response.token_pair()).await?;
        Ok(response)
    }

    /// Create an account and store the issued pair.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .post(REGISTER_PATH, request, RequestOptions::new().skip_auth())
            .await?;
        self.replace_session(response.token_pair()).await?;
        Ok(response)
    }

    /// Forget the session and every cached response.
    pub async fn logout(&self) -> Result<()> {
        let runtime = self.runtime().await?;
        runtime.tokens.clear().await?;
        runtime.cache.clear(None).await;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        self.get(ME_PATH, RequestOptions::new().require_auth()).await
    }

    /// Drop cached responses whose key contains `pattern`, or all of them.
    pub async fn clear_cache(&self, pattern: Option<&str>) -> Result<()> {
        self.runtime().await?.cache.clear(pattern).await;
        Ok(())
    }

    pub async fn set_tokens(&self, pair: TokenPair) -> Result<()> {
        self.replace_session(pair).await
    }

    /// Store `pair`; cached responses are dropped when the account changes.
    async fn replace_session(&self, pair: TokenPair) -> Result<()> {
        let runtime = self.runtime().await?;
        let previous = runtime.tokens.current().map(|p| p.user_id);
        let user_id = pair.user_id;
        runtime.tokens.set(pair).await?;

        if previous != Some(user_id) {
            debug!(user_id = %user_id, "session changed, clearing response cache");
            runtime.cache.clear(None).await;
        }
        Ok(())
    }

    pub async fn tokens(&self) -> Result<Option<TokenPair>> {
        Ok(self.runtime().await?.tokens.current())
    }

    /// Refreshes performed by this client.
    pub async fn refresh_count(&self) -> Result<u64> {
        Ok(self.runtime().await?.tokens.refresh_count())
    }
}

fn decode<T: DeserializeOwned>(response: PipelineResponse) -> Result<T> {
    Ok(serde_json::from_value(response.body)?)
}
