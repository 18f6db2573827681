//! Client configuration
//!
//! [`ClientConfig`] is built with [`ClientConfig::builder`] or produced by a
//! [`ConfigProvider`] when the client initializes.
//!
//! # Example
//!
//! ```ignore
//! use gatekeep_client::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .base_url("https://api.example.com")
//!     .request_timeout(Duration::from_secs(10))
//!     .max_retries(2)
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::retry::{Backoff, RetryConfig};

/// Environment variable holding the API base URL.
pub const ENV_BASE_URL: &str = "API_BASE_URL";
/// Environment variable holding the per-request timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "API_TIMEOUT";

/// Default response/error phase order.
pub const DEFAULT_STAGE_ORDER: [&str; 4] = ["logging", "cache", "retry", "auth"];

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("initialization timed out after {0:?}")]
    InitTimeout(Duration),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    request_timeout: Duration,
    init_timeout: Duration,
    refresh_timeout: Duration,
    retry: RetryConfig,
    cache_capacity: u64,
    stage_order: Vec<String>,
    user_agent: String,
}

impl ClientConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// API base URL, always ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Deadline for a single transport call.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Deadline for client initialization.
    pub fn init_timeout(&self) -> Duration {
        self.init_timeout
    }

    /// How long a caller waits on a shared token refresh.
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    /// Default retry policy; per-request directives override it.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn cache_capacity(&self) -> u64 {
        self.cache_capacity
    }

    /// Stage names in response/error phase order.
    pub fn stage_order(&self) -> &[String] {
        &self.stage_order
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Resolve `path` against the base URL.
    ///
    /// Absolute URLs are used as-is; a leading `/` is relative to the base.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        if let Ok(url) = Url::parse(path) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::Invalid {
                name: "path",
                message: format!("{path}: {e}"),
            })
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    request_timeout: Duration,
    init_timeout: Duration,
    refresh_timeout: Duration,
    retry: RetryConfig,
    cache_capacity: u64,
    stage_order: Vec<String>,
    user_agent: String,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(30),
            init_timeout: Duration::from_secs(10),
            refresh_timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
            cache_capacity: 1_000,
            stage_order: DEFAULT_STAGE_ORDER.iter().map(|s| s.to_string()).collect(),
            user_agent: concat!("gatekeep-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    #[must_use]
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.retry.backoff = backoff;
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Override the response/error phase order.
    #[must_use]
    pub fn stage_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage_order = order.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let raw = self.base_url.ok_or(ConfigError::Missing(ENV_BASE_URL))?;
        let mut base_url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
            name: ENV_BASE_URL,
            message: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: ENV_BASE_URL,
                message: format!("unsupported scheme {}", base_url.scheme()),
            });
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("init_timeout", self.init_timeout),
            ("refresh_timeout", self.refresh_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    name,
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(ClientConfig {
            base_url,
            request_timeout: self.request_timeout,
            init_timeout: self.init_timeout,
            refresh_timeout: self.refresh_timeout,
            retry: self.retry,
            cache_capacity: self.cache_capacity,
            stage_order: self.stage_order,
            user_agent: self.user_agent,
        })
    }
}

/// Source of client configuration, consulted once at initialization.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn load(&self) -> Result<ClientConfig, ConfigError>;
}

/// Fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider(pub ClientConfig);

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn load(&self) -> Result<ClientConfig, ConfigError> {
        Ok(self.0.clone())
    }
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `API_BASE_URL` and `API_TIMEOUT` (milliseconds).
#[derive(Clone)]
pub struct EnvConfigProvider {
    lookup: Lookup,
    base: ClientConfigBuilder,
}

impl EnvConfigProvider {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read from an arbitrary key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
            base: ClientConfigBuilder::default(),
        }
    }

    /// Settings not covered by the environment.
    #[must_use]
    pub fn with_defaults(mut self, base: ClientConfigBuilder) -> Self {
        self.base = base;
        self
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfigProvider")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigProvider for EnvConfigProvider {
    async fn load(&self) -> Result<ClientConfig, ConfigError> {
        let base_url = (self.lookup)(ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_BASE_URL))?;

        let mut builder = self.base.clone().base_url(base_url);
        if let Some(raw) = (self.lookup)(ENV_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: ENV_TIMEOUT_MS,
                message: format!("expected milliseconds, got {raw:?}"),
            })?;
            builder = builder.request_timeout(Duration::from_millis(millis));
        }

        builder.build()
    }
}
