//! Temporary pre-auth sessions.
//!
//! Created by the login flow after the primary credential succeeds; a
//! session authenticates exactly one 2FA completion and is terminal once
//! completed or expired.

use chrono::Duration;
use service_core::error::{AppError, SecurityViolation};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{LoginData, TempSession, TwoFactorMethod};
use crate::services::clock::Clock;
use crate::services::store::TwoFactorStore;
use crate::utils::codes::session_token;

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub ttl: Duration,
    pub max_attempts: i32,
}

pub struct TempSessionStore {
    store: Arc<dyn TwoFactorStore>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl TempSessionStore {
    pub fn new(store: Arc<dyn TwoFactorStore>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Create a session for a user whose primary credential just verified.
    pub async fn create(
        &self,
        user_id: Uuid,
        login_data: &LoginData,
        method: TwoFactorMethod,
    ) -> Result<TempSession, AppError> {
        let session = TempSession::new(
            user_id,
            session_token(),
            login_data,
            method,
            self.policy.max_attempts,
            self.policy.ttl,
            self.clock.now(),
        );
        self.store.insert_temp_session(&session).await?;

        tracing::debug!(
            user_id = %user_id,
            session_id = %session.session_id,
            method = %session.method_code,
            "Temp session created"
        );
        Ok(session)
    }

    /// Look up a session by token and reject anything terminal: missing,
    /// expired, completed, or out of attempts.
    pub async fn validate(&self, token: &str) -> Result<TempSession, AppError> {
        let session = self
            .store
            .find_temp_session(token)
            .await?
            .ok_or(AppError::SecurityError(SecurityViolation::InvalidSession))?;

        if !session.is_usable(self.clock.now()) {
            return Err(AppError::SecurityError(SecurityViolation::InvalidSession));
        }

        Ok(session)
    }

    /// Count a failed code submission against the session.
    pub async fn register_attempt(&self, session: &TempSession) -> Result<(), AppError> {
        self.store
            .increment_session_attempts(session.session_id)
            .await
    }

    /// Mark the session completed. Only call after a verified success.
    /// Completing twice is a no-op.
    pub async fn complete(&self, session: &TempSession) -> Result<(), AppError> {
        self.store
            .complete_temp_session(session.session_id, self.clock.now())
            .await
    }

    /// Delete expired and completed sessions.
    pub async fn purge_finished(&self) -> Result<u64, AppError> {
        self.store.purge_finished_sessions(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::memory::MemoryStore;
    use chrono::Utc;

    fn harness() -> (Arc<MemoryStore>, Arc<ManualClock>, TempSessionStore) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = TempSessionStore::new(
            store.clone(),
            clock.clone(),
            SessionPolicy {
                ttl: Duration::minutes(10),
                max_attempts: 5,
            },
        );
        (store, clock, sessions)
    }

    #[tokio::test]
    async fn created_session_validates_by_token() {
        let (_store, _clock, sessions) = harness();
        let user_id = Uuid::new_v4();
        let session = sessions
            .create(user_id, &LoginData::default(), TwoFactorMethod::App)
            .await
            .expect("create");

        let found = sessions.validate(&session.session_token).await.expect("validate");
        assert_eq!(found.user_id, user_id);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let (_store, _clock, sessions) = harness();
        assert!(matches!(
            sessions.validate("no-such-token").await,
            Err(AppError::SecurityError(SecurityViolation::InvalidSession))
        ));
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let (_store, clock, sessions) = harness();
        let session = sessions
            .create(Uuid::new_v4(), &LoginData::default(), TwoFactorMethod::App)
            .await
            .expect("create");

        clock.advance(Duration::minutes(11));
        assert!(sessions.validate(&session.session_token).await.is_err());
    }

    #[tokio::test]
    async fn completed_session_is_terminal() {
        let (_store, _clock, sessions) = harness();
        let session = sessions
            .create(Uuid::new_v4(), &LoginData::default(), TwoFactorMethod::App)
            .await
            .expect("create");

        sessions.complete(&session).await.expect("complete");
        assert!(sessions.validate(&session.session_token).await.is_err());

        // Idempotent: double completion is a no-op, not an error.
        sessions.complete(&session).await.expect("complete again");
    }

    #[tokio::test]
    async fn exhausted_attempts_reject_even_before_expiry() {
        let (_store, _clock, sessions) = harness();
        let session = sessions
            .create(Uuid::new_v4(), &LoginData::default(), TwoFactorMethod::App)
            .await
            .expect("create");

        for _ in 0..5 {
            sessions.register_attempt(&session).await.expect("attempt");
        }
        assert!(sessions.validate(&session.session_token).await.is_err());
    }

    #[tokio::test]
    async fn purge_removes_expired_and_completed() {
        let (store, clock, sessions) = harness();
        let user_id = Uuid::new_v4();
        let done = sessions
            .create(user_id, &LoginData::default(), TwoFactorMethod::App)
            .await
            .expect("create");
        sessions.complete(&done).await.expect("complete");

        sessions
            .create(user_id, &LoginData::default(), TwoFactorMethod::App)
            .await
            .expect("create");

        clock.advance(Duration::minutes(11));
        let removed = sessions.purge_finished().await.expect("purge");
        assert_eq!(removed, 2);
        assert!(store.sessions_for(user_id).is_empty());
    }
}
