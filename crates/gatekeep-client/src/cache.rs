//! Response caching stage
//!
//! Successful responses for requests carrying a [`CacheDirective`] are kept
//! in a bounded `moka` cache. A fresh entry answers the request before it
//! reaches the transport.
//!
//! # Keys
//!
//! Unless the directive names one, the key is `METHOD normalized-url`, with
//! ` body:<digest>` appended when a JSON body is sent. Normalization sorts
//! query pairs and drops the fragment, so `?b=2&a=1` and `?a=1&b=2` share an
//! entry. Keys stay readable so [`ResponseCache::clear`] can match on path
//! fragments.
//!
//! ```ignore
//! let users: Vec<User> = client
//!     .get("/api/users", RequestOptions::new().cached(Duration::from_secs(60)))
//!     .await?;
//!
//! client.clear_cache(Some("/api/users")).await;
//! ```
//!
//! [`CacheDirective`]: crate::request::CacheDirective

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use reqwest::Method;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use url::Url;

use crate::metrics;
use crate::pipeline::{Stage, StageOutcome};
use crate::request::{PipelineRequest, PipelineResponse};
use crate::ClientError;

/// Hex characters of the body digest kept in a key.
const BODY_DIGEST_LEN: usize = 16;

/// Cache failures. Logged, never returned to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to derive cache key: {0}")]
    Key(String),
}

/// One stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub status: u16,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Bounded response cache shared by every request of a client.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, Arc<CacheEntry>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Key for `request`: the explicit directive key or a derived one.
    pub fn key_for(request: &PipelineRequest) -> Result<String, CacheError> {
        if let Some(key) = request.cache.as_ref().and_then(|c| c.key.clone()) {
            return Ok(key);
        }
        Self::derive_key(&request.method, &request.url, request.body.as_json())
    }

    pub fn derive_key(method: &Method, url: &Url, body: Option<&Value>) -> Result<String, CacheError> {
        let mut key = format!("{} {}", method, normalize_url(url));
        if let Some(body) = body.filter(|b| !b.is_null()) {
            let bytes = serde_json::to_vec(body).map_err(|e| CacheError::Key(e.to_string()))?;
            let digest = hex::encode(Sha256::digest(&bytes));
            key.push_str(" body:");
            key.push_str(&digest[..BODY_DIGEST_LEN]);
        }
        Ok(key)
    }

    /// Fresh entry for `key`. Stale entries are evicted on sight.
    pub async fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.get(key).await?;
        if entry.is_fresh_at(Instant::now()) {
            return Some(entry);
        }
        self.evict_if_unchanged(key, &entry).await;
        None
    }

    /// Drop `stale` unless a newer entry replaced it since it was read.
    async fn evict_if_unchanged(&self, key: &str, stale: &Arc<CacheEntry>) {
        let result = self
            .entries
            .entry_by_ref(key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(current) if Arc::ptr_eq(current.value(), stale) => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        if matches!(result, CompResult::Removed(_)) {
            trace!(key, "evicted stale cache entry");
        }
    }

    pub async fn insert(&self, key: String, status: u16, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            status,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.insert(key, Arc::new(entry)).await;
    }

    /// Remove entries whose key contains `pattern`, or every entry.
    pub async fn clear(&self, pattern: Option<&str>) {
        match pattern {
            None => {
                self.entries.invalidate_all();
                debug!("response cache cleared");
            }
            Some(pattern) => {
                let matching: Vec<Arc<String>> = self
                    .entries
                    .iter()
                    .filter(|(key, _)| key.contains(pattern))
                    .map(|(key, _)| key)
                    .collect();
                for key in &matching {
                    self.entries.invalidate(key.as_str()).await;
                }
                debug!(pattern, removed = matching.len(), "response cache entries cleared");
            }
        }
    }

    /// Approximate number of entries.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fresh entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }
}

/// Sorted query pairs, no fragment.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        normalized.set_query(None);
    } else {
        pairs.sort();
        normalized.query_pairs_mut().clear().extend_pairs(pairs);
    }
    normalized.to_string()
}

/// Pipeline stage serving and storing cached responses.
#[derive(Debug, Clone)]
pub struct CacheStage {
    cache: ResponseCache,
}

impl CacheStage {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}

#[async_trait]
impl Stage for CacheStage {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn on_request(&self, request: &mut PipelineRequest) -> Result<StageOutcome, ClientError> {
        let Some(directive) = request.cache.clone() else {
            return Ok(StageOutcome::Continue);
        };

        let key = match ResponseCache::key_for(request) {
            Ok(key) => key,
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "cache disabled for request");
                request.cache = None;
                return Ok(StageOutcome::Continue);
            }
        };
        if let Some(cache) = request.cache.as_mut() {
            cache.key = Some(key.clone());
        }

        if directive.force_refresh {
            trace!(request_id = %request.id, key = %key, "cache bypassed");
            return Ok(StageOutcome::Continue);
        }

        match self.cache.get(&key).await {
            Some(entry) => {
                metrics::record_cache(true);
                debug!(request_id = %request.id, key = %key, "cache hit");
                let mut response = PipelineResponse::new(entry.status, entry.value.clone());
                response.from_cache = true;
                Ok(StageOutcome::ShortCircuit(response))
            }
            None => {
                metrics::record_cache(false);
                Ok(StageOutcome::Continue)
            }
        }
    }

    async fn on_response(&self, request: &PipelineRequest, response: &mut PipelineResponse) {
        let Some(directive) = &request.cache else {
            return;
        };
        if response.from_cache || !response.is_success() {
            return;
        }

        let key = match &directive.key {
            Some(key) => key.clone(),
            None => match ResponseCache::key_for(request) {
                Ok(key) => key,
                Err(err) => {
                    warn!(request_id = %request.id, error = %err, "response not cached");
                    return;
                }
            },
        };
        self.cache
            .insert(key, response.status, response.body.clone(), directive.ttl)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_normalize_sorts_query_and_drops_fragment() {
        assert_eq!(
            normalize_url(&url("http://api.local/items?b=2&a=1#top")),
            "http://api.local/items?a=1&b=2"
        );
        assert_eq!(normalize_url(&url("http://api.local/items?")), "http://api.local/items");
    }

    #[test]
    fn test_derive_key() {
        let get = ResponseCache::derive_key(&Method::GET, &url("http://api.local/items"), None).unwrap();
        assert_eq!(get, "GET http://api.local/items");

        let body = json!({"q": "rust"});
        let post = ResponseCache::derive_key(&Method::POST, &url("http://api.local/search"), Some(&body)).unwrap();
        assert!(post.starts_with("POST http://api.local/search body:"));
        assert_eq!(post.len(), "POST http://api.local/search body:".len() + BODY_DIGEST_LEN);

        let other = json!({"q": "go"});
        let post2 = ResponseCache::derive_key(&Method::POST, &url("http://api.local/search"), Some(&other)).unwrap();
        assert_ne!(post, post2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResponseCache::new(100);
        cache
            .insert("k".into(), 200, json!({"v": 1}), Duration::from_secs(10))
            .await;

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k").await.unwrap().value, json!({"v": 1}));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_read_keeps_newer_entry() {
        let cache = ResponseCache::new(100);
        cache
            .insert("k".into(), 200, json!({"v": 1}), Duration::from_secs(1))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;
        let stale = cache.entries.get("k").await.unwrap();

        // a fresh response lands between the stale read and its eviction
        cache
            .insert("k".into(), 200, json!({"v": 2}), Duration::from_secs(60))
            .await;
        cache.evict_if_unchanged("k", &stale).await;
        assert_eq!(cache.get("k").await.unwrap().value, json!({"v": 2}));

        let current = cache.entries.get("k").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.evict_if_unchanged("k", &current).await;
        assert!(cache.entries.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_by_pattern() {
        let cache = ResponseCache::new(100);
        let ttl = Duration::from_secs(60);
        cache.insert("GET http://api.local/users".into(), 200, json!([]), ttl).await;
        cache.insert("GET http://api.local/users/1".into(), 200, json!({}), ttl).await;
        cache.insert("GET http://api.local/orders".into(), 200, json!([]), ttl).await;

        cache.clear(Some("/users")).await;
        assert!(!cache.contains("GET http://api.local/users").await);
        assert!(!cache.contains("GET http://api.local/users/1").await);
        assert!(cache.contains("GET http://api.local/orders").await);

        cache.clear(None).await;
        assert!(!cache.contains("GET http://api.local/orders").await);
    }
}
