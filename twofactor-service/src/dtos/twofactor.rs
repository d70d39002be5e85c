//! Request/response DTOs for the two-factor API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{TwoFactorMethod, VerificationChannel};
use crate::services::engine::{LoginChallenge, SetupOutcome, SmsDispatch, TwoFactorStatus};

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub method: TwoFactorMethod,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub method: TwoFactorMethod,
    /// Base32 seed, returned once, app method only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// otpauth:// URI the dashboard renders as a QR code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otpauth_uri: Option<String>,
}

impl From<SetupOutcome> for SetupResponse {
    fn from(outcome: SetupOutcome) -> Self {
        Self {
            method: outcome.method,
            secret: outcome.secret,
            otpauth_uri: outcome.otpauth_uri,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct EnableResponse {
    pub enabled: bool,
    /// Plaintext backup codes, shown to the user exactly once.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
    pub method: Option<VerificationChannel>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<TwoFactorMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub backup_codes_remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl From<TwoFactorStatus> for StatusResponse {
    fn from(status: TwoFactorStatus) -> Self {
        Self {
            state: status.state.as_str().to_string(),
            method: status.method,
            phone_number: status.phone_number,
            backup_codes_remaining: status.backup_codes_remaining,
            locked_until: status.locked_until,
            last_verified_at: status.last_verified_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegenerateBackupCodesResponse {
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SendSmsResponse {
    pub expires_at: DateTime<Utc>,
}

impl From<SmsDispatch> for SendSmsResponse {
    fn from(dispatch: SmsDispatch) -> Self {
        Self {
            expires_at: dispatch.expires_at,
        }
    }
}

/// Service-to-service: the auth layer creates a challenge after the
/// primary credential succeeds.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_token: String,
    pub method: TwoFactorMethod,
    pub expires_at: DateTime<Utc>,
}

impl From<LoginChallenge> for CreateSessionResponse {
    fn from(challenge: LoginChallenge) -> Self {
        Self {
            session_token: challenge.session_token,
            method: challenge.method,
            expires_at: challenge.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionVerifyRequest {
    pub session_token: String,
    pub code: String,
    pub method: Option<VerificationChannel>,
}

#[derive(Debug, Serialize)]
pub struct SessionVerifyResponse {
    pub user_id: Uuid,
    pub verified: bool,
}
