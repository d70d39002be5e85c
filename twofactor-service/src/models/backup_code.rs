//! Backup code model - single-use fallback credentials, stored hashed.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Backup code entity. Only the hash is ever persisted; the plaintext is
/// handed to the user exactly once at generation time.
#[derive(Debug, Clone, FromRow)]
pub struct BackupCode {
    pub code_id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub used_ip: Option<String>,
    pub used_user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl BackupCode {
    pub fn new(
        user_id: Uuid,
        code_hash: String,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            code_id: Uuid::new_v4(),
            user_id,
            code_hash,
            is_used: false,
            used_at: None,
            used_ip: None,
            used_user_agent: None,
            expires_at,
            created_utc: now,
        }
    }

    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_code_is_redeemable() {
        let now = Utc::now();
        let code = BackupCode::new(
            Uuid::new_v4(),
            "abc".to_string(),
            now + chrono::Duration::days(365),
            now,
        );
        assert!(code.is_redeemable(now));
    }

    #[test]
    fn used_or_expired_code_is_not_redeemable() {
        let now = Utc::now();
        let mut code = BackupCode::new(
            Uuid::new_v4(),
            "abc".to_string(),
            now + chrono::Duration::days(365),
            now,
        );
        code.is_used = true;
        assert!(!code.is_redeemable(now));

        code.is_used = false;
        code.expires_at = now - chrono::Duration::seconds(1);
        assert!(!code.is_redeemable(now));
    }
}
