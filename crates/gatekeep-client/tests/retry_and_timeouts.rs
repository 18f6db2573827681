//! Bounded retries and per-call deadlines

mod common;

use std::time::Duration;

use gatekeep_client::{ClientConfig, ClientError, PipelineResponse, RequestOptions};
use serde_json::{json, Value};

use common::{client_with, test_config, CountingRefresher, FakeTransport, BASE_URL};

#[tokio::test]
async fn test_no_retries_by_default() {
    let transport = FakeTransport::fixed(503, json!({"message": "down"}));
    let client = client_with(test_config(), transport.clone(), CountingRefresher::new());

    let err = client
        .get::<Value>("/api/items", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Server { status: 503, .. }), "got {err:?}");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let transport = FakeTransport::fixed(503, json!({"message": "down"}));
    let client = client_with(test_config(), transport.clone(), CountingRefresher::new());

    let err = client
        .get::<Value>("/api/items", RequestOptions::new().retries(2))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Server { status: 503, .. }));
    assert_eq!(transport.calls(), 3);
    let attempts: Vec<u32> = transport.seen().iter().map(|s| s.attempt).collect();
    assert_eq!(attempts, [1, 2, 3]);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let transport = FakeTransport::new(|_, n| {
        if n < 3 {
            Err(ClientError::network("connection reset"))
        } else {
            Ok(PipelineResponse::new(200, json!({"n": n})))
        }
    });
    let client = client_with(test_config(), transport.clone(), CountingRefresher::new());

    let body: Value = client
        .get("/api/items", RequestOptions::new().retries(2))
        .await
        .unwrap();

    assert_eq!(body, json!({"n": 3}));
    assert_eq!(transport.calls(), 3);
    assert_eq!(transport.seen()[2].attempt, 3);
}

#[tokio::test]
async fn test_rate_limit_is_retried_client_errors_are_not() {
    let limited = FakeTransport::fixed(429, json!({"message": "slow down"}));
    let client = client_with(test_config(), limited.clone(), CountingRefresher::new());
    let _ = client
        .get::<Value>("/a", RequestOptions::new().retries(1))
        .await;
    assert_eq!(limited.calls(), 2);

    let invalid = FakeTransport::fixed(
        400,
        json!({"error": {"code": "VALIDATION_ERROR", "message": "bad email"}}),
    );
    let client = client_with(test_config(), invalid.clone(), CountingRefresher::new());
    let err = client
        .post::<_, Value>("/a", &json!({"email": "x"}), RequestOptions::new().retries(3))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation { ref message, .. } if message == "bad email"));
    assert_eq!(invalid.calls(), 1);
}

#[tokio::test]
async fn test_client_default_retry_policy() {
    let config = ClientConfig::builder()
        .base_url(BASE_URL)
        .max_retries(1)
        .retry_delay(Duration::from_millis(1))
        .build()
        .unwrap();
    let transport = FakeTransport::fixed(500, Value::Null);
    let client = client_with(config, transport.clone(), CountingRefresher::new());

    let _ = client.get::<Value>("/a", RequestOptions::new()).await;
    assert_eq!(transport.calls(), 2);

    // a per-request directive overrides the client default
    let _ = client.get::<Value>("/a", RequestOptions::new().retries(0)).await;
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_transport_times_out() {
    let config = ClientConfig::builder()
        .base_url(BASE_URL)
        .request_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let transport = FakeTransport::with_delay(Duration::from_secs(5), |_, _| {
        Ok(PipelineResponse::new(200, json!({})))
    });
    let client = client_with(config, transport.clone(), CountingRefresher::new());

    let err = client
        .get::<Value>("/api/slow", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried() {
    let config = ClientConfig::builder()
        .base_url(BASE_URL)
        .request_timeout(Duration::from_millis(100))
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    let transport = FakeTransport::with_delay(Duration::from_secs(5), |_, _| {
        Ok(PipelineResponse::new(200, json!({})))
    });
    let client = client_with(config, transport.clone(), CountingRefresher::new());

    let err = client
        .get::<Value>("/api/slow", RequestOptions::new().retries(2))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_per_request_timeout_override() {
    let transport = FakeTransport::with_delay(Duration::from_millis(500), |_, _| {
        Ok(PipelineResponse::new(200, json!({"ok": true})))
    });
    let client = client_with(test_config(), transport.clone(), CountingRefresher::new());

    let err = client
        .get::<Value>("/a", RequestOptions::new().timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let ok: Value = client.get("/a", RequestOptions::new()).await.unwrap();
    assert_eq!(ok, json!({"ok": true}));
}

#[tokio::test]
async fn test_account_locked_is_typed() {
    let transport = FakeTransport::fixed(
        423,
        json!({"error": {
            "code": "ACCOUNT_LOCKED",
            "message": "account temporarily locked",
            "details": {"lockUntil": "2031-05-01T12:00:00Z"}
        }}),
    );
    let client = client_with(test_config(), transport, CountingRefresher::new());

    let err = client.login("ada@example.com", "wrong-password").await.unwrap_err();
    match err {
        ClientError::AccountLocked { until, .. } => {
            assert_eq!(until.unwrap().to_rfc3339(), "2031-05-01T12:00:00+00:00")
        }
        other => panic!("expected AccountLocked, got {other:?}"),
    }
}
