//! Common test utilities for gatekeep-client integration tests

pub mod fakes;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use gatekeep_client::{ClientConfig, HttpClient, Transport};
use gatekeep_types::{Role, TokenPair, UserId};

#[allow(unused_imports)]
pub use fakes::{CountingConfigProvider, CountingRefresher, FakeTransport, SeenRequest};

pub const BASE_URL: &str = "http://api.test";

/// Fast-failing configuration for pipeline tests
pub fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .base_url(BASE_URL)
        .request_timeout(Duration::from_secs(5))
        .retry_delay(Duration::from_millis(1))
        .build()
        .expect("valid test config")
}

/// Client over `transport` with `refresher` standing in for the refresh endpoint
pub fn client_with(
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    refresher: Arc<CountingRefresher>,
) -> HttpClient {
    HttpClient::builder()
        .config(config)
        .transport(transport)
        .token_refresher(refresher)
        .build()
}

/// Token pair whose access token is `access`
pub fn pair(access: &str) -> TokenPair {
    let now = Utc::now();
    TokenPair {
        access_token: access.to_string(),
        refresh_token: format!("refresh-for-{access}"),
        user_id: UserId::new(),
        role: Role::User,
        issued_at: now,
        access_expires_at: now + ChronoDuration::minutes(15),
        refresh_expires_at: now + ChronoDuration::days(7),
    }
}

/// Token pair whose access token expired a minute ago
pub fn expired_pair(access: &str) -> TokenPair {
    let mut pair = pair(access);
    pair.access_expires_at = Utc::now() - ChronoDuration::minutes(1);
    pair
}
