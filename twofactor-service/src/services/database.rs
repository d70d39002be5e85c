//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{BackupCode, TempSession, TwoFactorSettings, VerificationAttempt};
use crate::services::store::TwoFactorStore;

/// PostgreSQL implementation of [`TwoFactorStore`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!(e))
}

#[async_trait]
impl TwoFactorStore for PostgresStore {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ==================== Settings ====================

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<TwoFactorSettings>, AppError> {
        sqlx::query_as::<_, TwoFactorSettings>(
            "SELECT * FROM two_factor_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn upsert_settings(&self, settings: &TwoFactorSettings) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_settings (
                user_id, method_code, encrypted_secret, phone_number, is_enabled,
                failed_attempts, locked_until, last_verified_at,
                sms_last_sent_at, sms_attempts_count, sms_attempts_reset_at,
                created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (user_id) DO UPDATE SET
                method_code = EXCLUDED.method_code,
                encrypted_secret = EXCLUDED.encrypted_secret,
                phone_number = EXCLUDED.phone_number,
                is_enabled = EXCLUDED.is_enabled,
                failed_attempts = EXCLUDED.failed_attempts,
                locked_until = EXCLUDED.locked_until,
                last_verified_at = EXCLUDED.last_verified_at,
                sms_last_sent_at = EXCLUDED.sms_last_sent_at,
                sms_attempts_count = EXCLUDED.sms_attempts_count,
                sms_attempts_reset_at = EXCLUDED.sms_attempts_reset_at,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(settings.user_id)
        .bind(&settings.method_code)
        .bind(&settings.encrypted_secret)
        .bind(&settings.phone_number)
        .bind(settings.is_enabled)
        .bind(settings.failed_attempts)
        .bind(settings.locked_until)
        .bind(settings.last_verified_at)
        .bind(settings.sms_last_sent_at)
        .bind(settings.sms_attempts_count)
        .bind(settings.sms_attempts_reset_at)
        .bind(settings.created_utc)
        .bind(settings.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_settings(&self, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM two_factor_settings WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn register_failure(
        &self,
        user_id: Uuid,
        threshold: i32,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorSettings, AppError> {
        sqlx::query_as::<_, TwoFactorSettings>(
            r#"
            UPDATE two_factor_settings
            SET failed_attempts = failed_attempts + 1,
                locked_until = CASE
                    WHEN failed_attempts + 1 >= $2 THEN $3
                    ELSE locked_until
                END,
                updated_utc = $4
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(threshold)
        .bind(locked_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Two-factor settings not found")))
    }

    async fn register_success(
        &self,
        user_id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE two_factor_settings
            SET failed_attempts = 0,
                locked_until = NULL,
                last_verified_at = $2,
                updated_utc = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(verified_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_enabled(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE two_factor_settings
            SET is_enabled = TRUE,
                failed_attempts = 0,
                locked_until = NULL,
                updated_utc = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_sms_window(
        &self,
        user_id: Uuid,
        sent_at: DateTime<Utc>,
        attempts_count: i32,
        reset_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE two_factor_settings
            SET sms_last_sent_at = $2,
                sms_attempts_count = $3,
                sms_attempts_reset_at = $4,
                updated_utc = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(sent_at)
        .bind(attempts_count)
        .bind(reset_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ==================== Backup codes ====================

    async fn replace_backup_codes(
        &self,
        user_id: Uuid,
        codes: &[BackupCode],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM two_factor_backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for code in codes {
            sqlx::query(
                r#"
                INSERT INTO two_factor_backup_codes (
                    code_id, user_id, code_hash, is_used,
                    used_at, used_ip, used_user_agent, expires_at, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(code.code_id)
            .bind(code.user_id)
            .bind(&code.code_hash)
            .bind(code.is_used)
            .bind(code.used_at)
            .bind(&code.used_ip)
            .bind(&code.used_user_agent)
            .bind(code.expires_at)
            .bind(code.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_unused_backup_codes(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<BackupCode>, AppError> {
        sqlx::query_as::<_, BackupCode>(
            r#"
            SELECT * FROM two_factor_backup_codes
            WHERE user_id = $1 AND is_used = FALSE AND expires_at > $2
            ORDER BY created_utc
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn count_unused_backup_codes(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM two_factor_backup_codes
            WHERE user_id = $1 AND is_used = FALSE AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn consume_backup_code(
        &self,
        code_id: Uuid,
        used_at: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE two_factor_backup_codes
            SET is_used = TRUE,
                used_at = $2,
                used_ip = $3,
                used_user_agent = $4
            WHERE code_id = $1 AND is_used = FALSE
            "#,
        )
        .bind(code_id)
        .bind(used_at)
        .bind(ip_address)
        .bind(user_agent)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_backup_codes(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM two_factor_backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // ==================== Temp sessions ====================

    async fn insert_temp_session(&self, session: &TempSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_temp_sessions (
                session_id, user_id, session_token, login_data, method_code,
                attempts_count, max_attempts, is_completed, verified_at,
                created_utc, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.session_token)
        .bind(&session.login_data)
        .bind(&session.method_code)
        .bind(session.attempts_count)
        .bind(session.max_attempts)
        .bind(session.is_completed)
        .bind(session.verified_at)
        .bind(session.created_utc)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_temp_session(&self, token: &str) -> Result<Option<TempSession>, AppError> {
        sqlx::query_as::<_, TempSession>(
            "SELECT * FROM two_factor_temp_sessions WHERE session_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn latest_active_sms_session(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TempSession>, AppError> {
        sqlx::query_as::<_, TempSession>(
            r#"
            SELECT * FROM two_factor_temp_sessions
            WHERE user_id = $1
              AND method_code = 'sms'
              AND is_completed = FALSE
              AND expires_at > $2
              AND attempts_count < max_attempts
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn increment_session_attempts(&self, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE two_factor_temp_sessions
            SET attempts_count = attempts_count + 1
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn complete_temp_session(
        &self,
        session_id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE two_factor_temp_sessions
            SET is_completed = TRUE, verified_at = $2
            WHERE session_id = $1 AND is_completed = FALSE
            "#,
        )
        .bind(session_id)
        .bind(verified_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn purge_finished_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM two_factor_temp_sessions WHERE expires_at < $1 OR is_completed = TRUE",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // ==================== Verification attempts ====================

    async fn insert_attempt(&self, attempt: &VerificationAttempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_verification_attempts (
                attempt_id, user_id, channel_code, attempted_code_hash,
                is_successful, failure_reason, ip_address, user_agent,
                risk_score, attempted_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(attempt.attempt_id)
        .bind(attempt.user_id)
        .bind(&attempt.channel_code)
        .bind(&attempt.attempted_code_hash)
        .bind(attempt.is_successful)
        .bind(&attempt.failure_reason)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.risk_score)
        .bind(attempt.attempted_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn prune_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM two_factor_verification_attempts WHERE attempted_utc < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
