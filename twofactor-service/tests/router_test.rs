//! HTTP surface tests over the in-memory backend.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::TestHarness;
use http_body_util::BodyExt;
use serde_json::Value;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use tower::util::ServiceExt;
use uuid::Uuid;

use twofactor_service::config::{
    DatabaseConfig, Environment, PolicyConfig, RateLimitConfig, SecurityConfig, SmsConfig,
    TwoFactorConfig,
};
use twofactor_service::{build_router, AppState};

fn test_config() -> TwoFactorConfig {
    TwoFactorConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "twofactor-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        security: SecurityConfig {
            master_key: "integration-test-master-key-0123456789".to_string(),
            totp_issuer: "Association".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        policy: PolicyConfig {
            max_failed_attempts: 5,
            lockout_minutes: 15,
            member_reverify_minutes: 30,
            admin_reverify_minutes: 15,
            session_ttl_minutes: 10,
            session_max_attempts: 5,
            sms_code_length: 6,
            sms_hourly_limit: 5,
            backup_code_count: 10,
            backup_code_length: 10,
            backup_code_ttl_days: 365,
            attempt_retention_days: 90,
            cleanup_interval_seconds: 300,
        },
        sms: SmsConfig {
            gateway_url: "http://notification-service:8080".to_string(),
            api_key: "test".to_string(),
            sender_id: "Association".to_string(),
        },
        rate_limit: RateLimitConfig {
            verify_attempts: 1000,
            verify_window_seconds: 60,
            sms_send_attempts: 1000,
            sms_send_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

fn test_app(harness: &TestHarness) -> axum::Router {
    let state = AppState {
        config: test_config(),
        store: harness.store.clone(),
        engine: harness.engine.clone(),
        verify_rate_limiter: create_ip_rate_limiter(1000, 60),
        sms_rate_limiter: create_ip_rate_limiter(1000, 60),
        ip_rate_limiter: create_ip_rate_limiter(10_000, 60),
    };
    build_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let harness = TestHarness::new();
    let app = test_app(&harness);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn status_requires_gateway_identity() {
    let harness = TestHarness::new();
    let app = test_app(&harness);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/2fa/status")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_for_unconfigured_user() {
    let harness = TestHarness::new();
    let app = test_app(&harness);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/2fa/status")
                .header("x-user-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["state"], "not_configured");
    assert_eq!(body["backup_codes_remaining"], 0);
}

#[tokio::test]
async fn setup_returns_secret_and_uri_for_app_method() {
    let harness = TestHarness::new();
    let app = test_app(&harness);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/2fa/setup")
                .header("x-user-id", Uuid::new_v4().to_string())
                .header("content-type", "application/json")
                .body(Body::from(r#"{"method":"app"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["method"], "app");
    assert!(body["secret"].as_str().expect("secret").len() >= 16);
    assert!(body["otpauth_uri"]
        .as_str()
        .expect("uri")
        .starts_with("otpauth://totp/"));
}

#[tokio::test]
async fn wrong_code_is_unauthorized_and_nonspecific() {
    let harness = TestHarness::new();
    let (user_id, _, _) = harness.enroll_app_user().await;
    let app = test_app(&harness);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/2fa/verify")
                .header("x-user-id", user_id.to_string())
                .header("content-type", "application/json")
                .body(Body::from(r#"{"code":"000000"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid verification code");
}

#[tokio::test]
async fn locked_account_returns_423_with_retry_after() {
    let harness = TestHarness::new();
    let (user_id, _, _) = harness.enroll_app_user().await;

    for _ in 0..5 {
        let _ = harness
            .engine
            .verify(user_id, "000000", None, &common::ctx())
            .await;
    }

    let app = test_app(&harness);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/2fa/verify")
                .header("x-user-id", user_id.to_string())
                .header("content-type", "application/json")
                .body(Body::from(r#"{"code":"000000"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::LOCKED);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn admin_route_requires_admin_identity() {
    let harness = TestHarness::new();
    let (user_id, _, _) = harness.enroll_app_user().await;
    let app = test_app(&harness);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/2fa/admin/users/{}/disable", user_id))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/2fa/admin/users/{}/disable", user_id))
                .header("x-admin-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
