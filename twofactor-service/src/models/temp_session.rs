//! Temporary pre-auth session model.
//!
//! Bridges the gap between primary-credential success and 2FA completion
//! during login. Terminal once completed or expired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TwoFactorMethod;

/// Opaque login snapshot captured at password-verification time.
///
/// For SMS sessions, `code_hash` carries the SHA-256 of the dispatched code;
/// the plaintext code never touches storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginData {
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<String>,
}

/// Temporary session entity.
#[derive(Debug, Clone, FromRow)]
pub struct TempSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub session_token: String,
    pub login_data: serde_json::Value,
    pub method_code: String,
    pub attempts_count: i32,
    pub max_attempts: i32,
    pub is_completed: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TempSession {
    pub fn new(
        user_id: Uuid,
        session_token: String,
        login_data: &LoginData,
        method: TwoFactorMethod,
        max_attempts: i32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            session_token,
            login_data: serde_json::to_value(login_data).unwrap_or(serde_json::Value::Null),
            method_code: method.as_str().to_string(),
            attempts_count: 0,
            max_attempts,
            is_completed: false,
            verified_at: None,
            created_utc: now,
            expires_at: now + ttl,
        }
    }

    pub fn method(&self) -> TwoFactorMethod {
        TwoFactorMethod::parse(&self.method_code)
    }

    pub fn login_data(&self) -> LoginData {
        serde_json::from_value(self.login_data.clone()).unwrap_or_default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts_count >= self.max_attempts
    }

    /// A session can authenticate only while uncompleted, unexpired, and
    /// under its attempt budget.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && !self.is_expired(now) && !self.attempts_exhausted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> TempSession {
        TempSession::new(
            Uuid::new_v4(),
            "token".to_string(),
            &LoginData {
                email: Some("member@example.com".to_string()),
                ..Default::default()
            },
            TwoFactorMethod::App,
            5,
            Duration::minutes(10),
            now,
        )
    }

    #[test]
    fn fresh_session_is_usable() {
        let now = Utc::now();
        assert!(session(now).is_usable(now));
    }

    #[test]
    fn completed_session_is_terminal() {
        let now = Utc::now();
        let mut s = session(now);
        s.is_completed = true;
        assert!(!s.is_usable(now));
    }

    #[test]
    fn expired_session_is_terminal() {
        let now = Utc::now();
        let s = session(now);
        assert!(!s.is_usable(now + Duration::minutes(11)));
    }

    #[test]
    fn exhausted_attempts_block_the_session() {
        let now = Utc::now();
        let mut s = session(now);
        s.attempts_count = s.max_attempts;
        assert!(!s.is_usable(now));
    }

    #[test]
    fn login_data_round_trips_through_json() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(
            s.login_data().email.as_deref(),
            Some("member@example.com")
        );
        assert!(s.login_data().code_hash.is_none());
    }
}
