//! In-memory storage backend for tests and local development.
//!
//! Mirrors the conditional-update semantics of the PostgreSQL backend so
//! the concurrency contract can be exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{BackupCode, TempSession, TwoFactorSettings, VerificationAttempt};
use crate::services::store::TwoFactorStore;

#[derive(Default)]
struct Inner {
    settings: HashMap<Uuid, TwoFactorSettings>,
    backup_codes: Vec<BackupCode>,
    sessions: Vec<TempSession>,
    attempts: Vec<VerificationAttempt>,
}

/// In-memory implementation of [`TwoFactorStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    /// All recorded attempts for a user, oldest first. Test helper.
    pub fn attempts_for(&self, user_id: Uuid) -> Vec<VerificationAttempt> {
        self.lock()
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All sessions for a user. Test helper.
    pub fn sessions_for(&self, user_id: Uuid) -> Vec<TempSession> {
        self.lock()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All backup-code rows for a user, including used ones. Test helper.
    pub fn backup_codes_for(&self, user_id: Uuid) -> Vec<BackupCode> {
        self.lock()
            .backup_codes
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TwoFactorStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    // ==================== Settings ====================

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<TwoFactorSettings>, AppError> {
        Ok(self.lock().settings.get(&user_id).cloned())
    }

    async fn upsert_settings(&self, settings: &TwoFactorSettings) -> Result<(), AppError> {
        self.lock().settings.insert(settings.user_id, settings.clone());
        Ok(())
    }

    async fn delete_settings(&self, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.lock().settings.remove(&user_id).is_some())
    }

    async fn register_failure(
        &self,
        user_id: Uuid,
        threshold: i32,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorSettings, AppError> {
        let mut inner = self.lock();
        let settings = inner
            .settings
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Two-factor settings not found")))?;
        settings.failed_attempts += 1;
        if settings.failed_attempts >= threshold {
            settings.locked_until = Some(locked_until);
        }
        settings.updated_utc = now;
        Ok(settings.clone())
    }

    async fn register_success(
        &self,
        user_id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(settings) = inner.settings.get_mut(&user_id) {
            settings.failed_attempts = 0;
            settings.locked_until = None;
            settings.last_verified_at = Some(verified_at);
            settings.updated_utc = verified_at;
        }
        Ok(())
    }

    async fn mark_enabled(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(settings) = inner.settings.get_mut(&user_id) {
            settings.is_enabled = true;
            settings.failed_attempts = 0;
            settings.locked_until = None;
            settings.updated_utc = now;
        }
        Ok(())
    }

    async fn update_sms_window(
        &self,
        user_id: Uuid,
        sent_at: DateTime<Utc>,
        attempts_count: i32,
        reset_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(settings) = inner.settings.get_mut(&user_id) {
            settings.sms_last_sent_at = Some(sent_at);
            settings.sms_attempts_count = attempts_count;
            settings.sms_attempts_reset_at = Some(reset_at);
            settings.updated_utc = sent_at;
        }
        Ok(())
    }

    // ==================== Backup codes ====================

    async fn replace_backup_codes(
        &self,
        user_id: Uuid,
        codes: &[BackupCode],
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        inner.backup_codes.retain(|c| c.user_id != user_id);
        inner.backup_codes.extend_from_slice(codes);
        Ok(())
    }

    async fn list_unused_backup_codes(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<BackupCode>, AppError> {
        Ok(self
            .lock()
            .backup_codes
            .iter()
            .filter(|c| c.user_id == user_id && c.is_redeemable(now))
            .cloned()
            .collect())
    }

    async fn count_unused_backup_codes(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        Ok(self
            .lock()
            .backup_codes
            .iter()
            .filter(|c| c.user_id == user_id && c.is_redeemable(now))
            .count() as i64)
    }

    async fn consume_backup_code(
        &self,
        code_id: Uuid,
        used_at: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        match inner
            .backup_codes
            .iter_mut()
            .find(|c| c.code_id == code_id && !c.is_used)
        {
            Some(code) => {
                code.is_used = true;
                code.used_at = Some(used_at);
                code.used_ip = ip_address.map(|s| s.to_string());
                code.used_user_agent = user_agent.map(|s| s.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_backup_codes(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let before = inner.backup_codes.len();
        inner.backup_codes.retain(|c| c.user_id != user_id);
        Ok((before - inner.backup_codes.len()) as u64)
    }

    // ==================== Temp sessions ====================

    async fn insert_temp_session(&self, session: &TempSession) -> Result<(), AppError> {
        self.lock().sessions.push(session.clone());
        Ok(())
    }

    async fn find_temp_session(&self, token: &str) -> Result<Option<TempSession>, AppError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|s| s.session_token == token)
            .cloned())
    }

    async fn latest_active_sms_session(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TempSession>, AppError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| {
                s.user_id == user_id && s.method_code == "sms" && s.is_usable(now)
            })
            .max_by_key(|s| s.created_utc)
            .cloned())
    }

    async fn increment_session_attempts(&self, session_id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.session_id == session_id) {
            session.attempts_count += 1;
        }
        Ok(())
    }

    async fn complete_temp_session(
        &self,
        session_id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id && !s.is_completed)
        {
            session.is_completed = true;
            session.verified_at = Some(verified_at);
        }
        Ok(())
    }

    async fn purge_finished_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|s| !s.is_completed && s.expires_at >= now);
        Ok((before - inner.sessions.len()) as u64)
    }

    // ==================== Verification attempts ====================

    async fn insert_attempt(&self, attempt: &VerificationAttempt) -> Result<(), AppError> {
        self.lock().attempts.push(attempt.clone());
        Ok(())
    }

    async fn prune_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let before = inner.attempts.len();
        inner.attempts.retain(|a| a.attempted_utc >= cutoff);
        Ok((before - inner.attempts.len()) as u64)
    }
}
