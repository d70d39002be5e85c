//! Verification attempt model - append-only audit rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which verifier handled a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationChannel {
    Totp,
    Sms,
    Backup,
}

impl VerificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationChannel::Totp => "totp",
            VerificationChannel::Sms => "sms",
            VerificationChannel::Backup => "backup",
        }
    }
}

/// Internal failure classification. Callers only ever see a generic
/// rejection; these land in the attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InvalidCode,
    NoActiveSession,
    SessionExhausted,
    CodeAlreadyUsed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidCode => "invalid_code",
            FailureReason::NoActiveSession => "no_active_session",
            FailureReason::SessionExhausted => "session_exhausted",
            FailureReason::CodeAlreadyUsed => "code_already_used",
        }
    }
}

/// Request metadata stamped onto attempts and consumed backup codes.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Verification attempt entity. Write-only from the engine's perspective.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationAttempt {
    pub attempt_id: Uuid,
    pub user_id: Uuid,
    pub channel_code: String,
    pub attempted_code_hash: String,
    pub is_successful: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub risk_score: i32,
    pub attempted_utc: DateTime<Utc>,
}

impl VerificationAttempt {
    pub fn success(
        user_id: Uuid,
        channel: VerificationChannel,
        attempted_code_hash: String,
        risk_score: i32,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            user_id,
            channel_code: channel.as_str().to_string(),
            attempted_code_hash,
            is_successful: true,
            failure_reason: None,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            risk_score,
            attempted_utc: now,
        }
    }

    pub fn failure(
        user_id: Uuid,
        channel: VerificationChannel,
        attempted_code_hash: String,
        reason: FailureReason,
        risk_score: i32,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            user_id,
            channel_code: channel.as_str().to_string(),
            attempted_code_hash,
            is_successful: false,
            failure_reason: Some(reason.as_str().to_string()),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            risk_score,
            attempted_utc: now,
        }
    }
}
