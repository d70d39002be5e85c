//! Two-factor orchestration: the Setup/Enable/Verify/Disable state machine.
//!
//! Per-user lifecycle: `NotConfigured -> PendingSetup -> Enabled ->
//! NotConfigured`. Preconditions are checked before any mutation, so an
//! illegal transition never touches storage.

use chrono::{DateTime, Duration, Utc};
use service_core::error::{AppError, SecurityViolation};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    BackupCode, FailureReason, LoginData, RequestContext, TwoFactorMethod, TwoFactorSettings,
    TwoFactorState, VerificationChannel,
};
use crate::services::attempts::{AttemptLedger, LockoutPolicy};
use crate::services::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::services::channel::{ChannelOutcome, ChannelVerifier};
use crate::services::cipher::SecretCipher;
use crate::services::clock::Clock;
use crate::services::sessions::{SessionPolicy, TempSessionStore};
use crate::services::sms::SmsProvider;
use crate::services::store::TwoFactorStore;
use crate::services::totp::{TotpConfig, TotpVerifier};
use crate::utils::codes::{backup_code_batch, hash_code, numeric_code};
use crate::utils::validation::validate_phone_number;

/// Tunable thresholds and timers. The lockout duration and the two
/// re-verification staleness windows are distinct knobs that happen to
/// share values in places; nothing may assume they are equal.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub totp_issuer: String,
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
    pub member_reverify_minutes: i64,
    pub admin_reverify_minutes: i64,
    pub session_ttl_minutes: i64,
    pub session_max_attempts: i32,
    pub sms_code_length: usize,
    pub sms_hourly_limit: i32,
    pub backup_code_count: usize,
    pub backup_code_length: usize,
    pub backup_code_ttl_days: i64,
    pub attempt_retention_days: i64,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            totp_issuer: "Association".to_string(),
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
        }
    }
}

/// Status snapshot for the dashboard security panel.
#[derive(Debug, Clone)]
pub struct TwoFactorStatus {
    pub state: TwoFactorState,
    pub method: Option<TwoFactorMethod>,
    pub phone_number: Option<String>,
    pub backup_codes_remaining: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// Returned by Setup. The secret and URI are handed out exactly once, for
/// the app method only.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub method: TwoFactorMethod,
    pub secret: Option<String>,
    pub otpauth_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmsDispatch {
    pub expires_at: DateTime<Utc>,
}

/// Login-bridge challenge handed back to the auth layer.
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    pub session_token: String,
    pub method: TwoFactorMethod,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub sessions_removed: u64,
    pub attempts_pruned: u64,
}

/// Stateless engine over injected collaborators.
pub struct TwoFactorEngine {
    store: Arc<dyn TwoFactorStore>,
    cipher: SecretCipher,
    totp: TotpVerifier,
    sms: Arc<dyn SmsProvider>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    ledger: AttemptLedger,
    sessions: TempSessionStore,
    channels: ChannelVerifier,
    policy: EnginePolicy,
}

impl TwoFactorEngine {
    pub fn new(
        store: Arc<dyn TwoFactorStore>,
        sms: Arc<dyn SmsProvider>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        cipher: SecretCipher,
        policy: EnginePolicy,
    ) -> Self {
        let ledger = AttemptLedger::new(
            store.clone(),
            clock.clone(),
            LockoutPolicy {
                max_failed_attempts: policy.max_failed_attempts,
                lockout: Duration::minutes(policy.lockout_minutes),
            },
        );
        let sessions = TempSessionStore::new(
            store.clone(),
            clock.clone(),
            SessionPolicy {
                ttl: Duration::minutes(policy.session_ttl_minutes),
                max_attempts: policy.session_max_attempts,
            },
        );
        let channels = ChannelVerifier::new(store.clone(), clock.clone());
        let totp = TotpVerifier::new(TotpConfig::new(policy.totp_issuer.clone()));

        Self {
            store,
            cipher,
            totp,
            sms,
            audit,
            clock,
            ledger,
            sessions,
            channels,
            policy,
        }
    }

    /// The TOTP verifier, exposed for login simulators and tests.
    pub fn totp(&self) -> &TotpVerifier {
        &self.totp
    }

    // ==================== Status ====================

    pub async fn get_status(&self, user_id: Uuid) -> Result<TwoFactorStatus, AppError> {
        let settings = match self.store.get_settings(user_id).await? {
            Some(settings) => settings,
            None => {
                return Ok(TwoFactorStatus {
                    state: TwoFactorState::NotConfigured,
                    method: None,
                    phone_number: None,
                    backup_codes_remaining: 0,
                    locked_until: None,
                    last_verified_at: None,
                })
            }
        };

        let backup_codes_remaining = self
            .store
            .count_unused_backup_codes(user_id, self.clock.now())
            .await?;

        Ok(TwoFactorStatus {
            state: settings.state(),
            method: Some(settings.method()),
            phone_number: settings.masked_phone(),
            backup_codes_remaining,
            locked_until: settings.locked_until,
            last_verified_at: settings.last_verified_at,
        })
    }

    // ==================== Setup ====================

    /// Begin (or restart) enrollment. Rejected while already enabled.
    pub async fn setup(
        &self,
        user_id: Uuid,
        method: TwoFactorMethod,
        phone_number: Option<String>,
        ctx: &RequestContext,
    ) -> Result<SetupOutcome, AppError> {
        if let Some(existing) = self.store.get_settings(user_id).await? {
            if existing.is_enabled {
                // An enabled row whose secret no longer decrypts can be
                // neither verified nor disabled; re-setup is the recovery
                // path for that row.
                if self.cipher.decrypt(&existing.encrypted_secret).is_ok() {
                    return Err(AppError::ValidationError(
                        "Two-factor authentication is already enabled. Disable it before running setup again.".to_string(),
                    ));
                }
                tracing::error!(
                    user_id = %user_id,
                    "Stored two-factor secret is unusable; allowing re-setup"
                );
            }
        }

        let phone_number = match method {
            TwoFactorMethod::Sms => {
                let phone = phone_number.ok_or_else(|| {
                    AppError::ValidationError(
                        "A phone number is required for SMS verification".to_string(),
                    )
                })?;
                validate_phone_number(&phone)?;
                Some(phone)
            }
            TwoFactorMethod::App => None,
        };

        let enrollment = self.totp.enroll(&user_id.to_string())?;
        let encrypted_secret = self.cipher.encrypt(&enrollment.secret)?;

        let now = self.clock.now();
        let settings =
            TwoFactorSettings::pending(user_id, method, encrypted_secret, phone_number, now);
        self.store.upsert_settings(&settings).await?;

        tracing::info!(user_id = %user_id, method = method.as_str(), "Two-factor setup started");
        self.audit
            .record(AuditEvent::user_action(
                AuditEventType::SetupStarted,
                user_id,
                Some(serde_json::json!({ "method": method.as_str() })),
                ctx,
                now,
            ))
            .await;

        Ok(match method {
            TwoFactorMethod::App => SetupOutcome {
                method,
                secret: Some(enrollment.secret),
                otpauth_uri: Some(enrollment.otpauth_uri),
            },
            TwoFactorMethod::Sms => SetupOutcome {
                method,
                secret: None,
                otpauth_uri: None,
            },
        })
    }

    // ==================== Enable ====================

    /// Complete enrollment with a first successful verification. Returns
    /// the plaintext backup-code batch exactly once.
    pub async fn enable_with_code(
        &self,
        user_id: Uuid,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, AppError> {
        let settings = self.store.get_settings(user_id).await?.ok_or_else(|| {
            AppError::ValidationError(
                "Two-factor authentication has not been set up".to_string(),
            )
        })?;
        if settings.is_enabled {
            return Err(AppError::ValidationError(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        self.check_code(&settings, code, default_channel(&settings), ctx)
            .await?;

        let now = self.clock.now();
        self.store.mark_enabled(user_id, now).await?;
        let backup_codes = self.issue_backup_codes(user_id).await?;

        tracing::info!(user_id = %user_id, "Two-factor authentication enabled");
        self.audit
            .record(AuditEvent::user_action(
                AuditEventType::TwoFactorEnabled,
                user_id,
                Some(serde_json::json!({ "method": settings.method().as_str() })),
                ctx,
                now,
            ))
            .await;

        Ok(backup_codes)
    }

    // ==================== Verify ====================

    /// Verify a code for an enabled user. Lockout is checked first; the
    /// attempt is recorded whatever the outcome.
    pub async fn verify(
        &self,
        user_id: Uuid,
        code: &str,
        channel: Option<VerificationChannel>,
        ctx: &RequestContext,
    ) -> Result<(), AppError> {
        let settings = self.require_enabled(user_id).await?;
        let channel = channel.unwrap_or_else(|| default_channel(&settings));
        self.check_code(&settings, code, channel, ctx).await
    }

    // ==================== Disable ====================

    /// Disable 2FA after re-authenticating with the current method. The
    /// user returns to `NotConfigured`; re-enabling requires a fresh Setup.
    pub async fn disable(
        &self,
        user_id: Uuid,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<(), AppError> {
        let settings = self.require_enabled(user_id).await?;
        self.check_code(&settings, code, default_channel(&settings), ctx)
            .await?;

        self.store.purge_backup_codes(user_id).await?;
        self.store.delete_settings(user_id).await?;

        tracing::info!(user_id = %user_id, "Two-factor authentication disabled");
        self.audit
            .record(AuditEvent::user_action(
                AuditEventType::TwoFactorDisabled,
                user_id,
                None,
                ctx,
                self.clock.now(),
            ))
            .await;

        Ok(())
    }

    /// Administrative override: disable a member's 2FA without their
    /// re-auth. Audited separately with the acting admin's identity. When
    /// the admin has 2FA enabled, their own verification must be fresher
    /// than the (stricter) admin staleness window.
    pub async fn admin_force_disable(
        &self,
        admin_id: Uuid,
        target_user_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), AppError> {
        if let Some(admin_settings) = self.store.get_settings(admin_id).await? {
            if admin_settings.is_enabled {
                self.ensure_recent_verification(
                    &admin_settings,
                    self.policy.admin_reverify_minutes,
                )?;
            }
        }

        if self.store.get_settings(target_user_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User has no two-factor settings"
            )));
        }

        self.store.purge_backup_codes(target_user_id).await?;
        self.store.delete_settings(target_user_id).await?;

        tracing::warn!(
            admin_id = %admin_id,
            user_id = %target_user_id,
            "Two-factor authentication force-disabled by admin"
        );
        self.audit
            .record(AuditEvent::admin_action(
                AuditEventType::AdminForceDisabled,
                admin_id,
                target_user_id,
                None,
                ctx,
                self.clock.now(),
            ))
            .await;

        Ok(())
    }

    // ==================== Backup codes ====================

    /// Replace the batch. Sensitive action: requires a verification within
    /// the member staleness window. Returns the plaintext exactly once.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, AppError> {
        let settings = self.require_enabled(user_id).await?;
        self.ensure_recent_verification(&settings, self.policy.member_reverify_minutes)?;

        let backup_codes = self.issue_backup_codes(user_id).await?;

        self.audit
            .record(AuditEvent::user_action(
                AuditEventType::BackupCodesRegenerated,
                user_id,
                Some(serde_json::json!({ "count": backup_codes.len() })),
                ctx,
                self.clock.now(),
            ))
            .await;

        Ok(backup_codes)
    }

    // ==================== SMS ====================

    /// Dispatch a fresh SMS code. Capped by the rolling-hour window; the
    /// cap is a rate-limit failure, not a verification failure.
    pub async fn send_sms_code(
        &self,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<SmsDispatch, AppError> {
        let settings = self.store.get_settings(user_id).await?.ok_or_else(|| {
            AppError::ValidationError(
                "Two-factor authentication has not been set up".to_string(),
            )
        })?;
        if settings.method() != TwoFactorMethod::Sms {
            return Err(AppError::ValidationError(
                "SMS verification is not the configured method".to_string(),
            ));
        }

        let login_data = LoginData {
            email: None,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            code_hash: None,
        };
        let session = self.dispatch_sms(&settings, login_data, ctx).await?;
        Ok(SmsDispatch {
            expires_at: session.expires_at,
        })
    }

    // ==================== Login bridge ====================

    /// Create the pre-auth challenge after the primary credential verified.
    /// For the SMS method this also dispatches the code bound to the
    /// session.
    pub async fn create_login_session(
        &self,
        user_id: Uuid,
        email: Option<String>,
        ctx: &RequestContext,
    ) -> Result<LoginChallenge, AppError> {
        let settings = self.require_enabled(user_id).await?;

        let login_data = LoginData {
            email,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            code_hash: None,
        };

        let session = match settings.method() {
            TwoFactorMethod::App => {
                self.sessions
                    .create(user_id, &login_data, TwoFactorMethod::App)
                    .await?
            }
            TwoFactorMethod::Sms => self.dispatch_sms(&settings, login_data, ctx).await?,
        };

        Ok(LoginChallenge {
            session_token: session.session_token.clone(),
            method: session.method(),
            expires_at: session.expires_at,
        })
    }

    /// Verify a code against a login challenge and complete it. Returns the
    /// authenticated user id so the auth layer can mint its session.
    pub async fn verify_login_session(
        &self,
        session_token: &str,
        code: &str,
        channel: Option<VerificationChannel>,
        ctx: &RequestContext,
    ) -> Result<Uuid, AppError> {
        let session = self.sessions.validate(session_token).await?;
        let settings = self.require_enabled(session.user_id).await?;

        let channel = channel.unwrap_or(match session.method() {
            TwoFactorMethod::App => VerificationChannel::Totp,
            TwoFactorMethod::Sms => VerificationChannel::Sms,
        });

        match self.check_code(&settings, code, channel, ctx).await {
            Ok(()) => {
                self.sessions.complete(&session).await?;
                Ok(session.user_id)
            }
            Err(err) => {
                // The SMS strategy already counted the miss against its
                // session; other channels burn this session's budget here.
                if channel != VerificationChannel::Sms
                    && matches!(
                        err,
                        AppError::SecurityError(SecurityViolation::InvalidCode)
                    )
                {
                    self.sessions.register_attempt(&session).await?;
                }
                Err(err)
            }
        }
    }

    // ==================== Housekeeping ====================

    /// Periodic sweep: drop terminal temp sessions and prune old attempt
    /// rows. Idempotent and safe alongside live traffic.
    pub async fn cleanup_expired(&self) -> Result<CleanupReport, AppError> {
        let sessions_removed = self.sessions.purge_finished().await?;
        let cutoff = self.clock.now() - Duration::days(self.policy.attempt_retention_days);
        let attempts_pruned = self.store.prune_attempts_before(cutoff).await?;

        if sessions_removed > 0 || attempts_pruned > 0 {
            tracing::debug!(
                sessions_removed,
                attempts_pruned,
                "Two-factor housekeeping sweep completed"
            );
        }

        Ok(CleanupReport {
            sessions_removed,
            attempts_pruned,
        })
    }

    // ==================== Internals ====================

    async fn require_enabled(&self, user_id: Uuid) -> Result<TwoFactorSettings, AppError> {
        let settings = self.store.get_settings(user_id).await?.ok_or_else(|| {
            AppError::ValidationError(
                "Two-factor authentication is not enabled".to_string(),
            )
        })?;
        if !settings.is_enabled {
            return Err(AppError::ValidationError(
                "Two-factor authentication is not enabled".to_string(),
            ));
        }
        Ok(settings)
    }

    fn ensure_recent_verification(
        &self,
        settings: &TwoFactorSettings,
        window_minutes: i64,
    ) -> Result<(), AppError> {
        let fresh_enough = settings
            .last_verified_at
            .map(|at| self.clock.now() - at <= Duration::minutes(window_minutes))
            .unwrap_or(false);
        if !fresh_enough {
            return Err(AppError::SecurityError(
                SecurityViolation::ReverificationRequired,
            ));
        }
        Ok(())
    }

    /// Shared verification core: lockout gate, channel dispatch, attempt
    /// recording. The attempt row is written before any error is raised.
    async fn check_code(
        &self,
        settings: &TwoFactorSettings,
        code: &str,
        channel: VerificationChannel,
        ctx: &RequestContext,
    ) -> Result<(), AppError> {
        self.ledger.ensure_unlocked(settings)?;

        let outcome = match channel {
            VerificationChannel::Totp => {
                let secret = self.cipher.decrypt(&settings.encrypted_secret)?;
                if self.totp.verify_at(&secret, code, self.clock.now())? {
                    ChannelOutcome::Verified
                } else {
                    ChannelOutcome::Rejected(FailureReason::InvalidCode)
                }
            }
            VerificationChannel::Sms => self.channels.verify_sms(settings.user_id, code).await?,
            VerificationChannel::Backup => {
                self.channels
                    .verify_backup(settings.user_id, code, ctx)
                    .await?
            }
        };

        match outcome {
            ChannelOutcome::Verified => {
                self.ledger.record_success(settings, channel, code, ctx).await?;
                Ok(())
            }
            ChannelOutcome::Rejected(reason) => {
                let updated = self
                    .ledger
                    .record_failure(settings, channel, code, reason, ctx)
                    .await?;

                let now = self.clock.now();
                if updated.is_locked(now) {
                    self.audit
                        .record(AuditEvent::user_action(
                            AuditEventType::AccountLocked,
                            settings.user_id,
                            Some(serde_json::json!({
                                "failed_attempts": updated.failed_attempts,
                                "locked_until": updated.locked_until,
                            })),
                            ctx,
                            now,
                        ))
                        .await;
                }

                Err(AppError::SecurityError(SecurityViolation::InvalidCode))
            }
        }
    }

    async fn dispatch_sms(
        &self,
        settings: &TwoFactorSettings,
        mut login_data: LoginData,
        ctx: &RequestContext,
    ) -> Result<crate::models::TempSession, AppError> {
        let phone = settings.phone_number.as_deref().ok_or_else(|| {
            AppError::ValidationError("No phone number on file for SMS verification".to_string())
        })?;

        let now = self.clock.now();
        let (sent_in_window, reset_at) = match settings.sms_attempts_reset_at {
            Some(reset) if reset > now => (settings.sms_attempts_count, reset),
            _ => (0, now + Duration::hours(1)),
        };
        if sent_in_window >= self.policy.sms_hourly_limit {
            let retry_after = (reset_at - now).num_seconds().max(0) as u64;
            return Err(AppError::TooManyRequests(
                "SMS code limit reached. Please try again later.".to_string(),
                Some(retry_after),
            ));
        }

        let code = numeric_code(self.policy.sms_code_length);
        login_data.code_hash = Some(hash_code(&code));

        let session = self
            .sessions
            .create(settings.user_id, &login_data, TwoFactorMethod::Sms)
            .await?;

        self.sms.send_code(phone, &code).await?;

        self.store
            .update_sms_window(settings.user_id, now, sent_in_window + 1, reset_at)
            .await?;

        self.audit
            .record(AuditEvent::user_action(
                AuditEventType::SmsCodeSent,
                settings.user_id,
                None,
                ctx,
                now,
            ))
            .await;

        Ok(session)
    }

    async fn issue_backup_codes(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let now = self.clock.now();
        let plaintext = backup_code_batch(
            self.policy.backup_code_count,
            self.policy.backup_code_length,
        );
        let expires_at = now + Duration::days(self.policy.backup_code_ttl_days);
        let rows: Vec<BackupCode> = plaintext
            .iter()
            .map(|code| BackupCode::new(user_id, hash_code(code), expires_at, now))
            .collect();

        self.store.replace_backup_codes(user_id, &rows).await?;
        Ok(plaintext)
    }
}

fn default_channel(settings: &TwoFactorSettings) -> VerificationChannel {
    match settings.method() {
        TwoFactorMethod::App => VerificationChannel::Totp,
        TwoFactorMethod::Sms => VerificationChannel::Sms,
    }
}
