//! Failed-attempt tracking and progressive lockout.
//!
//! State machine: `Unlocked` counts consecutive failures; reaching the
//! threshold locks the account for the configured duration; a success or an
//! elapsed lock resets the counter. Every non-short-circuited attempt is
//! appended to the verification log before any error propagates, so audit
//! completeness does not depend on control flow.

use chrono::Duration;
use service_core::error::{AppError, SecurityViolation};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    FailureReason, RequestContext, TwoFactorSettings, VerificationAttempt, VerificationChannel,
};
use crate::services::clock::Clock;
use crate::services::store::TwoFactorStore;
use crate::utils::codes::hash_code;

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub lockout: Duration,
}

pub struct AttemptLedger {
    store: Arc<dyn TwoFactorStore>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl AttemptLedger {
    pub fn new(store: Arc<dyn TwoFactorStore>, clock: Arc<dyn Clock>, policy: LockoutPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Short-circuit while locked: no attempt slot is consumed and no
    /// verifier is contacted.
    pub fn ensure_unlocked(&self, settings: &TwoFactorSettings) -> Result<(), AppError> {
        let now = self.clock.now();
        if settings.is_locked(now) {
            return Err(AppError::SecurityError(SecurityViolation::AccountLocked {
                remaining_minutes: settings.lock_remaining_minutes(now),
            }));
        }
        Ok(())
    }

    /// Record a failed attempt and apply the lockout transition.
    ///
    /// The attempt row is written first; the counter increment is a single
    /// conditional update so concurrent failures each land. Returns the
    /// updated settings so the caller can detect a fresh lock.
    pub async fn record_failure(
        &self,
        settings: &TwoFactorSettings,
        channel: VerificationChannel,
        submitted_code: &str,
        reason: FailureReason,
        ctx: &RequestContext,
    ) -> Result<TwoFactorSettings, AppError> {
        let now = self.clock.now();
        let attempt = VerificationAttempt::failure(
            settings.user_id,
            channel,
            hash_code(submitted_code),
            reason,
            risk_score(settings.failed_attempts, channel),
            ctx,
            now,
        );
        self.store.insert_attempt(&attempt).await?;

        let updated = self
            .store
            .register_failure(
                settings.user_id,
                self.policy.max_failed_attempts,
                now + self.policy.lockout,
                now,
            )
            .await?;

        if updated.is_locked(now) {
            tracing::warn!(
                user_id = %settings.user_id,
                failed_attempts = updated.failed_attempts,
                "Two-factor verification locked"
            );
        }

        Ok(updated)
    }

    /// Record a successful attempt: appends the attempt row, resets the
    /// counter, clears any lock, and stamps `last_verified_at`.
    pub async fn record_success(
        &self,
        settings: &TwoFactorSettings,
        channel: VerificationChannel,
        submitted_code: &str,
        ctx: &RequestContext,
    ) -> Result<(), AppError> {
        let now = self.clock.now();
        let attempt = VerificationAttempt::success(
            settings.user_id,
            channel,
            hash_code(submitted_code),
            risk_score(settings.failed_attempts, channel),
            ctx,
            now,
        );
        self.store.insert_attempt(&attempt).await?;
        self.store.register_success(settings.user_id, now).await?;
        Ok(())
    }
}

/// Coarse 0-100 risk score persisted with each attempt row.
///
/// Prior failures dominate; backup-code use adds a bump since it usually
/// means the primary channel is unavailable.
fn risk_score(prior_failures: i32, channel: VerificationChannel) -> i32 {
    let base = (prior_failures * 15).min(75);
    let channel_weight = match channel {
        VerificationChannel::Totp => 0,
        VerificationChannel::Sms => 5,
        VerificationChannel::Backup => 20,
    };
    (base + channel_weight).min(100)
}
