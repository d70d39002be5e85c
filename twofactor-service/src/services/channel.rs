//! SMS-code and backup-code verification strategies.

use service_core::error::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::models::{FailureReason, RequestContext};
use crate::services::clock::Clock;
use crate::services::store::TwoFactorStore;
use crate::utils::codes::{hash_code, normalize_backup_code};

/// Result of a channel check. Rejections carry the internal reason for the
/// attempt log; callers surface a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    Verified,
    Rejected(FailureReason),
}

pub struct ChannelVerifier {
    store: Arc<dyn TwoFactorStore>,
    clock: Arc<dyn Clock>,
}

impl ChannelVerifier {
    pub fn new(store: Arc<dyn TwoFactorStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check a submitted code against the most recent active SMS session.
    ///
    /// Success completes the session; failure counts against its attempt
    /// budget.
    pub async fn verify_sms(&self, user_id: Uuid, code: &str) -> Result<ChannelOutcome, AppError> {
        let now = self.clock.now();
        let session = match self.store.latest_active_sms_session(user_id, now).await? {
            Some(session) => session,
            None => return Ok(ChannelOutcome::Rejected(FailureReason::NoActiveSession)),
        };

        let expected = match session.login_data().code_hash {
            Some(hash) => hash,
            None => return Ok(ChannelOutcome::Rejected(FailureReason::NoActiveSession)),
        };

        let submitted = hash_code(code.trim());
        if bool::from(submitted.as_bytes().ct_eq(expected.as_bytes())) {
            self.store
                .complete_temp_session(session.session_id, now)
                .await?;
            Ok(ChannelOutcome::Verified)
        } else {
            self.store
                .increment_session_attempts(session.session_id)
                .await?;
            Ok(ChannelOutcome::Rejected(FailureReason::InvalidCode))
        }
    }

    /// Check a submitted code against the user's unused backup codes.
    ///
    /// Every candidate is compared; no early exit on match. The winner is
    /// consumed with a conditional update, so a concurrent submission of
    /// the same code loses and is reported as already used.
    pub async fn verify_backup(
        &self,
        user_id: Uuid,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<ChannelOutcome, AppError> {
        let now = self.clock.now();
        let candidates = self.store.list_unused_backup_codes(user_id, now).await?;
        if candidates.is_empty() {
            return Ok(ChannelOutcome::Rejected(FailureReason::InvalidCode));
        }

        let submitted = hash_code(&normalize_backup_code(code));

        let mut matched: Option<Uuid> = None;
        for candidate in &candidates {
            if bool::from(submitted.as_bytes().ct_eq(candidate.code_hash.as_bytes())) {
                matched = Some(candidate.code_id);
            }
        }

        let code_id = match matched {
            Some(id) => id,
            None => return Ok(ChannelOutcome::Rejected(FailureReason::InvalidCode)),
        };

        let consumed = self
            .store
            .consume_backup_code(
                code_id,
                now,
                ctx.ip_address.as_deref(),
                ctx.user_agent.as_deref(),
            )
            .await?;

        if consumed {
            Ok(ChannelOutcome::Verified)
        } else {
            Ok(ChannelOutcome::Rejected(FailureReason::CodeAlreadyUsed))
        }
    }
}
