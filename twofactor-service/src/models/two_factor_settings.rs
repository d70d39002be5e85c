//! Two-factor settings model - one row per user, upsert semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Configured second factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorMethod {
    App,
    Sms,
}

impl TwoFactorMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorMethod::App => "app",
            TwoFactorMethod::Sms => "sms",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sms" => TwoFactorMethod::Sms,
            _ => TwoFactorMethod::App,
        }
    }
}

/// Lifecycle state derived from the settings row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorState {
    NotConfigured,
    PendingSetup,
    Enabled,
}

impl TwoFactorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorState::NotConfigured => "not_configured",
            TwoFactorState::PendingSetup => "pending_setup",
            TwoFactorState::Enabled => "enabled",
        }
    }
}

/// Two-factor settings entity.
///
/// `is_enabled = true` implies a non-empty encrypted secret and at least one
/// successful verification; rows are created pending and flipped by Enable.
#[derive(Debug, Clone, FromRow)]
pub struct TwoFactorSettings {
    pub user_id: Uuid,
    pub method_code: String,
    pub encrypted_secret: Vec<u8>,
    pub phone_number: Option<String>,
    pub is_enabled: bool,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub sms_last_sent_at: Option<DateTime<Utc>>,
    pub sms_attempts_count: i32,
    pub sms_attempts_reset_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TwoFactorSettings {
    /// Create a fresh pending-setup row.
    pub fn pending(
        user_id: Uuid,
        method: TwoFactorMethod,
        encrypted_secret: Vec<u8>,
        phone_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            method_code: method.as_str().to_string(),
            encrypted_secret,
            phone_number,
            is_enabled: false,
            failed_attempts: 0,
            locked_until: None,
            last_verified_at: None,
            sms_last_sent_at: None,
            sms_attempts_count: 0,
            sms_attempts_reset_at: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn method(&self) -> TwoFactorMethod {
        TwoFactorMethod::parse(&self.method_code)
    }

    pub fn state(&self) -> TwoFactorState {
        if self.is_enabled {
            TwoFactorState::Enabled
        } else {
            TwoFactorState::PendingSetup
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    /// Minutes until the lockout expires, rounded up. Zero when unlocked.
    pub fn lock_remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.locked_until {
            Some(until) if until > now => {
                let secs = (until - now).num_seconds();
                (secs + 59) / 60
            }
            _ => 0,
        }
    }

    /// Phone number with everything but the last two digits redacted.
    pub fn masked_phone(&self) -> Option<String> {
        self.phone_number.as_ref().map(|phone| {
            let digits = phone.len();
            if digits <= 2 {
                "*".repeat(digits)
            } else {
                format!("{}{}", "*".repeat(digits - 2), &phone[digits - 2..])
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> TwoFactorSettings {
        TwoFactorSettings::pending(
            Uuid::new_v4(),
            TwoFactorMethod::Sms,
            vec![1, 2, 3],
            Some("+4512345678".to_string()),
            now,
        )
    }

    #[test]
    fn pending_row_starts_disabled_and_unlocked() {
        let now = Utc::now();
        let settings = sample(now);
        assert_eq!(settings.state(), TwoFactorState::PendingSetup);
        assert!(!settings.is_locked(now));
        assert_eq!(settings.failed_attempts, 0);
    }

    #[test]
    fn lock_remaining_rounds_up() {
        let now = Utc::now();
        let mut settings = sample(now);
        settings.locked_until = Some(now + chrono::Duration::seconds(61));
        assert!(settings.is_locked(now));
        assert_eq!(settings.lock_remaining_minutes(now), 2);
    }

    #[test]
    fn expired_lock_is_not_locked() {
        let now = Utc::now();
        let mut settings = sample(now);
        settings.locked_until = Some(now - chrono::Duration::seconds(1));
        assert!(!settings.is_locked(now));
        assert_eq!(settings.lock_remaining_minutes(now), 0);
    }

    #[test]
    fn masked_phone_keeps_last_two_digits() {
        let settings = sample(Utc::now());
        assert_eq!(settings.masked_phone().as_deref(), Some("*********78"));
    }

    #[test]
    fn method_parse_defaults_to_app() {
        assert_eq!(TwoFactorMethod::parse("sms"), TwoFactorMethod::Sms);
        assert_eq!(TwoFactorMethod::parse("app"), TwoFactorMethod::App);
        assert_eq!(TwoFactorMethod::parse("junk"), TwoFactorMethod::App);
    }
}
