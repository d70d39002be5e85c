//! Storage trait for all two-factor persistence.
//!
//! The contract places the concurrency-sensitive operations behind single
//! conditional updates: failure counting is an atomic read-modify-write and
//! backup-code consumption only succeeds for the first caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{BackupCode, TempSession, TwoFactorSettings, VerificationAttempt};

#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    /// Ping the backing store.
    async fn health_check(&self) -> Result<(), AppError>;

    // ==================== Settings ====================

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<TwoFactorSettings>, AppError>;

    /// Insert or fully replace the settings row for a user.
    async fn upsert_settings(&self, settings: &TwoFactorSettings) -> Result<(), AppError>;

    /// Remove the settings row. Returns whether a row existed.
    async fn delete_settings(&self, user_id: Uuid) -> Result<bool, AppError>;

    /// Atomically increment the failure counter, applying `locked_until`
    /// when the new count reaches `threshold`. Returns the updated row so
    /// two concurrent failures cannot both observe the same count.
    async fn register_failure(
        &self,
        user_id: Uuid,
        threshold: i32,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorSettings, AppError>;

    /// Reset the failure counter, clear any lock, and stamp
    /// `last_verified_at`.
    async fn register_success(&self, user_id: Uuid, verified_at: DateTime<Utc>)
        -> Result<(), AppError>;

    /// Flip the row to enabled.
    async fn mark_enabled(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Update the SMS sliding-window counters.
    async fn update_sms_window(
        &self,
        user_id: Uuid,
        sent_at: DateTime<Utc>,
        attempts_count: i32,
        reset_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // ==================== Backup codes ====================

    /// Replace the user's batch wholesale: all prior codes (used or not)
    /// are removed before the new hashes are inserted.
    async fn replace_backup_codes(
        &self,
        user_id: Uuid,
        codes: &[BackupCode],
    ) -> Result<(), AppError>;

    async fn list_unused_backup_codes(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<BackupCode>, AppError>;

    async fn count_unused_backup_codes(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    /// Conditionally mark a code used (`WHERE is_used = FALSE`). Returns
    /// `false` when another request already consumed it.
    async fn consume_backup_code(
        &self,
        code_id: Uuid,
        used_at: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn purge_backup_codes(&self, user_id: Uuid) -> Result<u64, AppError>;

    // ==================== Temp sessions ====================

    async fn insert_temp_session(&self, session: &TempSession) -> Result<(), AppError>;

    async fn find_temp_session(&self, token: &str) -> Result<Option<TempSession>, AppError>;

    /// Most recent uncompleted, unexpired SMS session with attempts left.
    async fn latest_active_sms_session(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TempSession>, AppError>;

    async fn increment_session_attempts(&self, session_id: Uuid) -> Result<(), AppError>;

    /// Mark a session completed. Idempotent; completing twice is a no-op.
    async fn complete_temp_session(
        &self,
        session_id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Delete sessions that are expired or completed. Housekeeping only;
    /// such sessions are already unusable.
    async fn purge_finished_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    // ==================== Verification attempts ====================

    async fn insert_attempt(&self, attempt: &VerificationAttempt) -> Result<(), AppError>;

    async fn prune_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}
