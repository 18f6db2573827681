//! Common test utilities for gatekeep-auth-api integration tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use gatekeep_auth_api::{router, AppState, Config};
use gatekeep_auth_core::{AuthService, MemoryAuditSink};
use gatekeep_db::InMemoryAccountRepository;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse-battery";

/// Config with test secrets plus `extra` variables
pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: Vec<(String, String)> = vec![
        ("JWT_ACCESS_SECRET".into(), "access-secret-".repeat(3)),
        ("JWT_REFRESH_SECRET".into(), "refresh-secret-".repeat(3)),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    Config::from_lookup(move |key| {
        vars.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("test config is valid")
}

/// Router over a fresh in-memory credential store
pub fn app_with(config: Config) -> Router {
    app_with_audit(config).0
}

/// Router plus the audit sink its auth service records into
pub fn app_with_audit(config: Config) -> (Router, MemoryAuditSink) {
    let accounts = Arc::new(InMemoryAccountRepository::new());
    let audit = MemoryAuditSink::new();
    let auth = AuthService::new(config.auth.clone(), accounts)
        .expect("valid auth config")
        .with_audit_sink(Arc::new(audit.clone()));
    (router(AppState::new(auth, config)), audit)
}

pub fn app() -> Router {
    app_with(test_config(&[]))
}

/// Drive one request through the router and decode the JSON reply
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    };
    (status, body)
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn register_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": PASSWORD,
        "firstName": "Grace",
        "lastName": "Hopper"
    })
}

/// Register `email` and return the auth response body
pub async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send(app, post_json("/api/auth/register", register_body(email))).await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body
}

pub async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json("/api/auth/login", json!({ "email": email, "password": password })),
    )
    .await
}
