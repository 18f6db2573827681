//! Endpoint tests driven through the router with `oneshot`

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::json;

use gatekeep_auth_core::AuditEventType;

use common::{
    app, app_with, app_with_audit, get, login, post_json, register, register_body, send,
    test_config, PASSWORD,
};

#[tokio::test]
async fn test_register_returns_created_pair() {
    let app = app();
    let body = register(&app, "Grace@Example.com").await;

    assert_eq!(body["user"]["email"], "grace@example.com");
    assert_eq!(body["user"]["firstName"], "Grace");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["refreshToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert_ne!(body["token"], body["refreshToken"]);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = app();
    register(&app, "grace@example.com").await;

    let (status, body) = send(
        &app,
        post_json("/api/auth/register", register_body("GRACE@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "EMAIL_TAKEN");

    let (status, body) = send(
        &app,
        post_json("/api/auth/register", register_body("not-an-email")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let mut short = register_body("short@example.com");
    short["password"] = json!("short");
    let (status, _) = send(&app, post_json("/api/auth/register", short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_role_selection_is_opt_in() {
    let mut admin = register_body("root@example.com");
    admin["role"] = json!("admin");

    let (status, body) = send(&app(), post_json("/api/auth/register", admin.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let permissive = app_with(test_config(&[("ALLOW_ROLE_SELECTION", "true")]));
    let (status, body) = send(&permissive, post_json("/api/auth/register", admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "admin");
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let app = app();
    register(&app, "grace@example.com").await;

    let (status, body) = login(&app, "GRACE@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "grace@example.com");

    let (status, body) = login(&app, "grace@example.com", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    // unknown emails are indistinguishable from bad passwords
    let (status, body) = login(&app, "nobody@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_lockout_after_threshold() {
    let app = app_with(test_config(&[
        ("LOCKOUT_THRESHOLD", "3"),
        ("LOCKOUT_DURATION_SECS", "600"),
    ]));
    register(&app, "grace@example.com").await;

    for _ in 0..3 {
        let (status, body) = login(&app, "grace@example.com", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }

    let (status, body) = login(&app, "grace@example.com", "wrong-password").await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"]["code"], "ACCOUNT_LOCKED");
    let until: DateTime<Utc> = body["error"]["details"]["lockUntil"]
        .as_str()
        .expect("lockUntil present")
        .parse()
        .expect("RFC 3339 timestamp");
    assert!(until > Utc::now());

    // the right password does not get through a lock
    let (status, _) = login(&app, "grace@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn test_successful_login_resets_failures() {
    let app = app_with(test_config(&[("LOCKOUT_THRESHOLD", "3")]));
    register(&app, "grace@example.com").await;

    for _ in 0..2 {
        login(&app, "grace@example.com", "wrong-password").await;
    }
    let (status, _) = login(&app, "grace@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..2 {
        let (status, _) = login(&app, "grace@example.com", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = login(&app, "grace@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_issues_new_pair() {
    let app = app();
    let registered = register(&app, "grace@example.com").await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/refresh",
            json!({ "refreshToken": registered["refreshToken"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], registered["user"]["id"]);

    let (status, _) = send(
        &app,
        get("/api/auth/me", body["token"].as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_chain_rotates_pairs() {
    let app = app();
    let registered = register(&app, "grace@example.com").await;

    let (status, first) = send(
        &app,
        post_json("/api/auth/refresh", json!({ "refreshToken": registered["refreshToken"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = send(
        &app,
        post_json("/api/auth/refresh", json!({ "refreshToken": first["refreshToken"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for earlier in [&registered, &first] {
        assert_ne!(second["token"], earlier["token"]);
        assert_ne!(second["refreshToken"], earlier["refreshToken"]);
    }
}

#[tokio::test]
async fn test_refresh_rejects_wrong_tokens() {
    let app = app();
    let registered = register(&app, "grace@example.com").await;

    for token in [registered["token"].clone(), json!("garbage")] {
        let (status, body) = send(
            &app,
            post_json("/api/auth/refresh", json!({ "refreshToken": token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "REFRESH_INVALID");
    }
}

#[tokio::test]
async fn test_strict_rotation_rejects_reuse() {
    let refresh = |token: &serde_json::Value| {
        post_json("/api/auth/refresh", json!({ "refreshToken": token }))
    };

    let lenient = app();
    let registered = register(&lenient, "grace@example.com").await;
    for _ in 0..2 {
        let (status, _) = send(&lenient, refresh(&registered["refreshToken"])).await;
        assert_eq!(status, StatusCode::OK);
    }

    let strict = app_with(test_config(&[("STRICT_REFRESH_ROTATION", "true")]));
    let registered = register(&strict, "grace@example.com").await;
    let (status, rotated) = send(&strict, refresh(&registered["refreshToken"])).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&strict, refresh(&registered["refreshToken"])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "REFRESH_INVALID");

    let (status, _) = send(&strict, refresh(&rotated["refreshToken"])).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_me_requires_access_token() {
    let app = app();
    let registered = register(&app, "grace@example.com").await;

    let (status, body) = send(&app, get("/api/auth/me", registered["token"].as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "grace@example.com");
    assert_eq!(body["id"], registered["user"]["id"]);

    let (status, body) = send(&app, get("/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "TOKEN_MISSING");

    // refresh tokens are not access tokens
    let (status, body) = send(
        &app,
        get("/api/auth/me", registered["refreshToken"].as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_user_lookup_requires_moderator_for_others() {
    let app = app_with(test_config(&[("ALLOW_ROLE_SELECTION", "true")]));
    let grace = register(&app, "grace@example.com").await;
    let alan = register(&app, "alan@example.com").await;
    let mut moderator = register_body("mod@example.com");
    moderator["role"] = json!("moderator");
    let (status, moderator) = send(&app, post_json("/api/auth/register", moderator)).await;
    assert_eq!(status, StatusCode::CREATED);

    let grace_token = grace["token"].as_str();
    let own = format!("/api/users/{}", grace["user"]["id"].as_str().unwrap());
    let other = format!("/api/users/{}", alan["user"]["id"].as_str().unwrap());

    let (status, body) = send(&app, get(&own, grace_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "grace@example.com");

    let (status, body) = send(&app, get(&other, grace_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");

    let moderator_token = moderator["token"].as_str();
    let (status, body) = send(&app, get(&other, moderator_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alan@example.com");

    let missing = "/api/users/6f1c2f64-1f0e-4a43-9d8f-3a3c1f0b8d11";
    for uri in [missing, "/api/users/not-a-uuid"] {
        let (status, body) = send(&app, get(uri, moderator_token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "USER_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_every_rejected_bearer_is_audited() {
    let (app, audit) = app_with_audit(test_config(&[]));
    let basic = Request::builder()
        .method("GET")
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, "Basic abc")
        .body(Body::empty())
        .unwrap();

    let cases = [
        (get("/api/auth/me", None), "TOKEN_MISSING"),
        (basic, "TOKEN_INVALID"),
        (get("/api/auth/me", Some("garbage")), "TOKEN_INVALID"),
    ];
    for (request, code) in cases {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], code);
    }

    let reasons: Vec<_> = audit
        .events()
        .into_iter()
        .filter(|e| e.event_type == AuditEventType::AccessDenied)
        .map(|e| e.metadata["reason"].clone())
        .collect();
    assert_eq!(reasons, [json!("TOKEN_MISSING"), json!("TOKEN_INVALID"), json!("TOKEN_INVALID")]);
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime"].is_u64());
}
