//! Gatekeep Client - authenticated HTTP client
//!
//! Every call runs through a middleware pipeline of named stages:
//!
//! - **logging**: structured request/response logs, no secrets
//! - **cache**: TTL response cache keyed by method, URL and body
//! - **retry**: bounded backoff for network failures, 5xx and 429
//! - **auth**: bearer tokens with one shared refresh for concurrent 401s
//!
//! followed by a terminal mapper that turns HTTP failures into
//! [`ClientError`] variants.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod stages;
pub mod token_manager;
pub mod transport;

pub use cache::{CacheEntry, CacheError, CacheStage, ResponseCache};
pub use client::{HttpClient, HttpClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, ConfigProvider, EnvConfigProvider, StaticConfigProvider};
pub use error::{ClientError, Result};
pub use pipeline::{ErrorOutcome, Pipeline, PipelineBuilder, Stage, StageOutcome};
pub use request::{
    AuthDirective, CacheDirective, PipelineRequest, PipelineResponse, RequestBody, RequestOptions,
    RequestState, RetryDirective, Upload,
};
pub use retry::{Backoff, RetryConfig, RetryPolicy, RetryStage};
pub use stages::{AuthStage, LoggingStage};
pub use token_manager::{HttpTokenRefresher, MemoryTokenStore, TokenManager, TokenRefresher, TokenStore};
pub use transport::{ReqwestTransport, Transport};
