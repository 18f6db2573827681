//! Request and response types flowing through the pipeline

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::retry::Backoff;

/// Per-request caching directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirective {
    pub ttl: Duration,
    /// Explicit cache key; derived from method, URL and body when absent
    pub key: Option<String>,
    /// Skip the lookup but still store the fresh response
    pub force_refresh: bool,
}

impl CacheDirective {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            key: None,
            force_refresh: false,
        }
    }
}

/// Per-request retry overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryDirective {
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub backoff: Option<Backoff>,
}

/// Per-request auth directive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthDirective {
    /// Never attach a bearer token or attempt a refresh
    pub skip_auth: bool,
    /// Fail with `TokenMissing` instead of sending anonymously
    pub requires_auth: bool,
}

/// Options accepted by every façade request method
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub cache: Option<CacheDirective>,
    pub retry: Option<RetryDirective>,
    pub auth: AuthDirective,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Overrides the configured per-call deadline
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve from and store into the response cache for `ttl`.
    #[must_use]
    pub fn cached(mut self, ttl: Duration) -> Self {
        self.cache = Some(CacheDirective::new(ttl));
        self
    }

    #[must_use]
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache
            .get_or_insert_with(|| CacheDirective::new(Duration::from_secs(300)))
            .key = Some(key.into());
        self
    }

    #[must_use]
    pub fn force_refresh(mut self) -> Self {
        if let Some(cache) = self.cache.as_mut() {
            cache.force_refresh = true;
        }
        self
    }

    #[must_use]
    pub fn retries(mut self, max_retries: u32) -> Self {
        self.retry.get_or_insert_with(RetryDirective::default).max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.get_or_insert_with(RetryDirective::default).retry_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.retry.get_or_insert_with(RetryDirective::default).backoff = Some(backoff);
        self
    }

    #[must_use]
    pub fn skip_auth(mut self) -> Self {
        self.auth.skip_auth = true;
        self
    }

    #[must_use]
    pub fn require_auth(mut self) -> Self {
        self.auth.requires_auth = true;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// File sent as `multipart/form-data`
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Extra text fields sent alongside the file
    pub fields: Vec<(String, String)>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            content_type: None,
            bytes,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    #[must_use]
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("field_name", &self.field_name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Upload),
}

impl RequestBody {
    /// JSON used for cache key derivation; uploads are never keyed by content.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Empty | Self::Multipart(_) => None,
        }
    }
}

/// Lifecycle of one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Init,
    Sent,
    NeedsRefresh,
    Refreshing,
    Replayed,
    Retrying,
    TimedOut,
    Ok,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Init, Sent | Refreshing | Ok | Failed)
                | (Sent, Ok | Failed | NeedsRefresh | Retrying | TimedOut)
                | (TimedOut, Retrying | Failed)
                | (NeedsRefresh, Refreshing | Failed)
                | (Refreshing, Sent | Replayed | Failed)
                | (Replayed, Sent)
                | (Retrying, Sent)
        )
    }
}

/// One logical call, carried unchanged through every replay
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub id: Uuid,
    pub method: Method,
    pub url: Url,
    /// Lower-cased header names
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    /// Transport attempts made so far
    pub attempt_count: u32,
    pub cache: Option<CacheDirective>,
    pub retry: Option<RetryDirective>,
    pub auth: AuthDirective,
    pub state: RequestState,
    /// A 401-triggered refresh already happened for this request
    pub auth_refreshed: bool,
    pub timeout: Option<Duration>,
    pub started_at: Instant,
}

impl PipelineRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url,
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            attempt_count: 0,
            cache: None,
            retry: None,
            auth: AuthDirective::default(),
            state: RequestState::Init,
            auth_refreshed: false,
            timeout: None,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Apply façade options.
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        if !options.query.is_empty() {
            self.url
                .query_pairs_mut()
                .extend_pairs(options.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        for (name, value) in options.headers {
            self.set_header(&name, value);
        }
        self.cache = options.cache;
        self.retry = options.retry;
        self.auth = options.auth;
        self.timeout = options.timeout;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Bearer token currently attached, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Move to `next`, logging transitions the state machine does not expect.
    pub fn transition(&mut self, next: RequestState) {
        if !self.state.can_transition_to(next) {
            tracing::debug!(
                request_id = %self.id,
                from = ?self.state,
                to = ?next,
                "unexpected request state transition"
            );
        }
        tracing::trace!(request_id = %self.id, from = ?self.state, to = ?next, "request state");
        self.state = next;
    }
}

/// Decoded response
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON body; `Null` when empty, a string when not JSON
    pub body: Value,
    pub from_cache: bool,
}

impl PipelineResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
