//! Login-bridge sessions: challenge creation, single-use completion,
//! expiry, attempt budgets, and SMS dispatch limits.

mod common;

use chrono::Duration;
use common::{ctx, TestHarness};
use service_core::error::{AppError, SecurityViolation};
use std::sync::Arc;
use twofactor_service::models::TwoFactorMethod;
use twofactor_service::services::{
    EnginePolicy, FailingSmsProvider, SecretCipher, TwoFactorEngine,
};

#[tokio::test]
async fn app_login_challenge_round_trip() {
    let harness = TestHarness::new();
    let (user_id, secret, _) = harness.enroll_app_user().await;

    let challenge = harness
        .engine
        .create_login_session(user_id, Some("member@example.com".to_string()), &ctx())
        .await
        .expect("challenge");
    assert_eq!(challenge.method, TwoFactorMethod::App);

    let code = harness.totp_code(&secret);
    let verified_user = harness
        .engine
        .verify_login_session(&challenge.session_token, &code, None, &ctx())
        .await
        .expect("verify session");
    assert_eq!(verified_user, user_id);

    // Completed sessions are terminal; the token cannot authenticate again.
    let err = harness
        .engine
        .verify_login_session(&challenge.session_token, &code, None, &ctx())
        .await
        .expect_err("reuse");
    assert!(matches!(
        err,
        AppError::SecurityError(SecurityViolation::InvalidSession)
    ));
}

#[tokio::test]
async fn expired_challenge_rejects_even_a_correct_code() {
    let harness = TestHarness::new();
    let (user_id, secret, _) = harness.enroll_app_user().await;

    let challenge = harness
        .engine
        .create_login_session(user_id, None, &ctx())
        .await
        .expect("challenge");

    harness.clock.advance(Duration::minutes(11));
    let code = harness.totp_code(&secret);
    let err = harness
        .engine
        .verify_login_session(&challenge.session_token, &code, None, &ctx())
        .await
        .expect_err("expired");
    assert!(matches!(
        err,
        AppError::SecurityError(SecurityViolation::InvalidSession)
    ));
}

#[tokio::test]
async fn challenge_attempt_budget_is_enforced() {
    // Session budget of 3 with a high lockout threshold, so the session
    // limit is what trips.
    let policy = EnginePolicy {
        session_max_attempts: 3,
        max_failed_attempts: 10,
        ..Default::default()
    };
    let harness = TestHarness::with_policy(policy);
    let (user_id, secret, _) = harness.enroll_app_user().await;

    let challenge = harness
        .engine
        .create_login_session(user_id, None, &ctx())
        .await
        .expect("challenge");

    for _ in 0..3 {
        let err = harness
            .engine
            .verify_login_session(&challenge.session_token, "000000", None, &ctx())
            .await
            .expect_err("wrong code");
        assert!(matches!(
            err,
            AppError::SecurityError(SecurityViolation::InvalidCode)
        ));
    }

    // Budget exhausted: the correct code no longer helps.
    let code = harness.totp_code(&secret);
    let err = harness
        .engine
        .verify_login_session(&challenge.session_token, &code, None, &ctx())
        .await
        .expect_err("exhausted");
    assert!(matches!(
        err,
        AppError::SecurityError(SecurityViolation::InvalidSession)
    ));
}

#[tokio::test]
async fn sms_login_challenge_dispatches_and_verifies() {
    let harness = TestHarness::new();
    let (user_id, _) = harness.enroll_sms_user().await;

    let sent_before = harness.sms.sent().len();
    let challenge = harness
        .engine
        .create_login_session(user_id, None, &ctx())
        .await
        .expect("challenge");
    assert_eq!(challenge.method, TwoFactorMethod::Sms);
    assert_eq!(harness.sms.sent().len(), sent_before + 1);

    let code = harness.last_sms_code();
    let verified_user = harness
        .engine
        .verify_login_session(&challenge.session_token, &code, None, &ctx())
        .await
        .expect("verify");
    assert_eq!(verified_user, user_id);
}

#[tokio::test]
async fn sms_dispatch_is_capped_per_rolling_hour() {
    let harness = TestHarness::new();
    let (user_id, _) = harness.enroll_sms_user().await;

    // Enrollment consumed one send; the hourly budget is five.
    for _ in 0..4 {
        harness
            .engine
            .send_sms_code(user_id, &ctx())
            .await
            .expect("within budget");
    }

    let err = harness
        .engine
        .send_sms_code(user_id, &ctx())
        .await
        .expect_err("over budget");
    match err {
        AppError::TooManyRequests(_, retry_after) => {
            assert!(retry_after.expect("retry-after present") > 0);
        }
        other => panic!("expected TooManyRequests, got {other:?}"),
    }

    // The window rolls over and dispatch resumes.
    harness.clock.advance(Duration::hours(1) + Duration::seconds(1));
    harness
        .engine
        .send_sms_code(user_id, &ctx())
        .await
        .expect("fresh window");
}

#[tokio::test]
async fn sms_provider_failure_surfaces_as_dependency_error() {
    let harness = TestHarness::new();
    let (user_id, _) = harness.enroll_sms_user().await;

    // Same store, failing provider.
    let failing_engine = TwoFactorEngine::new(
        harness.store.clone(),
        Arc::new(FailingSmsProvider),
        harness.audit.clone(),
        harness.clock.clone(),
        SecretCipher::new("integration-test-master-key-0123456789").expect("cipher"),
        EnginePolicy::default(),
    );

    let err = failing_engine
        .send_sms_code(user_id, &ctx())
        .await
        .expect_err("provider down");
    assert!(matches!(err, AppError::DependencyError(_)));
}

#[tokio::test]
async fn cleanup_sweep_removes_terminal_sessions_and_old_attempts() {
    let harness = TestHarness::new();
    let (user_id, secret, _) = harness.enroll_app_user().await;

    // One completed and one soon-to-expire session.
    let challenge = harness
        .engine
        .create_login_session(user_id, None, &ctx())
        .await
        .expect("challenge");
    let code = harness.totp_code(&secret);
    harness
        .engine
        .verify_login_session(&challenge.session_token, &code, None, &ctx())
        .await
        .expect("verify");
    harness
        .engine
        .create_login_session(user_id, None, &ctx())
        .await
        .expect("second challenge");

    harness.clock.advance(Duration::days(91));
    let report = harness.engine.cleanup_expired().await.expect("sweep");
    assert_eq!(report.sessions_removed, 2);
    // Enrollment + two login verifications happened more than 90 days ago.
    assert!(report.attempts_pruned >= 2);
    assert!(harness.store.sessions_for(user_id).is_empty());
    assert!(harness.store.attempts_for(user_id).is_empty());

    // Sweeps are idempotent.
    let again = harness.engine.cleanup_expired().await.expect("sweep again");
    assert_eq!(again.sessions_removed, 0);
    assert_eq!(again.attempts_pruned, 0);
}
