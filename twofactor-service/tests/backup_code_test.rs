//! Backup code semantics: single use, batch replacement, concurrent
//! redemption, and the re-verification gate on regeneration.

mod common;

use chrono::Duration;
use common::{ctx, TestHarness};
use service_core::error::{AppError, SecurityViolation};
use twofactor_service::models::VerificationChannel;

#[tokio::test]
async fn each_backup_code_verifies_exactly_once() {
    let harness = TestHarness::new();
    let (user_id, _, backup_codes) = harness.enroll_app_user().await;

    let code = &backup_codes[0];
    harness
        .engine
        .verify(user_id, code, Some(VerificationChannel::Backup), &ctx())
        .await
        .expect("first redemption");

    let err = harness
        .engine
        .verify(user_id, code, Some(VerificationChannel::Backup), &ctx())
        .await
        .expect_err("second redemption");
    assert!(matches!(
        err,
        AppError::SecurityError(SecurityViolation::InvalidCode)
    ));

    let status = harness.engine.get_status(user_id).await.expect("status");
    assert_eq!(status.backup_codes_remaining, 9);

    // The consumed row is stamped with the caller's metadata.
    let used: Vec<_> = harness
        .store
        .backup_codes_for(user_id)
        .into_iter()
        .filter(|c| c.is_used)
        .collect();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].used_ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(used[0].used_user_agent.as_deref(), Some("integration-tests"));
}

#[tokio::test]
async fn regenerating_invalidates_every_prior_code() {
    let harness = TestHarness::new();
    let (user_id, _, old_codes) = harness.enroll_app_user().await;

    let new_codes = harness
        .engine
        .regenerate_backup_codes(user_id, &ctx())
        .await
        .expect("regenerate");
    assert_eq!(new_codes.len(), 10);

    // None of the old batch verifies afterward.
    for code in &old_codes {
        assert!(harness
            .engine
            .verify(user_id, code, Some(VerificationChannel::Backup), &ctx())
            .await
            .is_err());
    }

    // Those misses locked the account (10 > threshold); unlock by waiting.
    harness.clock.advance(Duration::minutes(16));
    harness
        .engine
        .verify(
            user_id,
            &new_codes[0],
            Some(VerificationChannel::Backup),
            &ctx(),
        )
        .await
        .expect("new code verifies");
}

#[tokio::test]
async fn regeneration_requires_recent_verification() {
    let harness = TestHarness::new();
    let (user_id, secret, _) = harness.enroll_app_user().await;

    // Thirty-one minutes after the last success the member window is stale.
    harness.clock.advance(Duration::minutes(31));
    let err = harness
        .engine
        .regenerate_backup_codes(user_id, &ctx())
        .await
        .expect_err("stale");
    assert!(matches!(
        err,
        AppError::SecurityError(SecurityViolation::ReverificationRequired)
    ));

    let code = harness.totp_code(&secret);
    harness
        .engine
        .verify(user_id, &code, None, &ctx())
        .await
        .expect("re-verify");
    harness
        .engine
        .regenerate_backup_codes(user_id, &ctx())
        .await
        .expect("regenerate after re-verify");
}

#[tokio::test]
async fn concurrent_redemption_of_one_code_has_exactly_one_winner() {
    let harness = TestHarness::new();
    let (user_id, _, backup_codes) = harness.enroll_app_user().await;
    let code = backup_codes[0].clone();

    let engine_a = harness.engine.clone();
    let engine_b = harness.engine.clone();
    let code_a = code.clone();
    let code_b = code.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move {
            engine_a
                .verify(user_id, &code_a, Some(VerificationChannel::Backup), &ctx())
                .await
        }),
        tokio::spawn(async move {
            engine_b
                .verify(user_id, &code_b, Some(VerificationChannel::Backup), &ctx())
                .await
        }),
    );
    let results = [a.expect("join"), b.expect("join")];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent redemption may win");

    // The code is marked used exactly once.
    let used = harness
        .store
        .backup_codes_for(user_id)
        .into_iter()
        .filter(|c| c.is_used)
        .count();
    assert_eq!(used, 1);
}

#[tokio::test]
async fn backup_codes_work_with_separators_and_lowercase() {
    let harness = TestHarness::new();
    let (user_id, _, backup_codes) = harness.enroll_app_user().await;

    let code = backup_codes[0].to_lowercase();
    let dashed = format!("{}-{}", &code[..5], &code[5..]);
    harness
        .engine
        .verify(user_id, &dashed, Some(VerificationChannel::Backup), &ctx())
        .await
        .expect("normalized redemption");
}
