//! Test harness for two-factor integration tests.
//!
//! Wires the engine over the in-memory store with a manual clock, a
//! capturing audit sink, and a mock SMS provider.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use twofactor_service::models::{RequestContext, TwoFactorMethod};
use twofactor_service::services::{
    CapturingAuditSink, Clock, EnginePolicy, ManualClock, MemoryStore, MockSmsProvider,
    SecretCipher, SmsProvider, TwoFactorEngine,
};

pub const TEST_PHONE: &str = "+4512345678";

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub sms: Arc<MockSmsProvider>,
    pub audit: Arc<CapturingAuditSink>,
    pub engine: Arc<TwoFactorEngine>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_policy(EnginePolicy::default())
    }

    pub fn with_policy(policy: EnginePolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
                .single()
                .expect("valid start time"),
        ));
        let sms = Arc::new(MockSmsProvider::new());
        let audit = Arc::new(CapturingAuditSink::new());

        let engine = Arc::new(TwoFactorEngine::new(
            store.clone(),
            sms.clone() as Arc<dyn SmsProvider>,
            audit.clone(),
            clock.clone(),
            SecretCipher::new("integration-test-master-key-0123456789").expect("cipher"),
            policy,
        ));

        Self {
            store,
            clock,
            sms,
            audit,
            engine,
        }
    }

    /// Run a full app-method enrollment. Returns the user id, the TOTP
    /// secret, and the issued backup codes.
    pub async fn enroll_app_user(&self) -> (Uuid, String, Vec<String>) {
        let user_id = Uuid::new_v4();
        let outcome = self
            .engine
            .setup(user_id, TwoFactorMethod::App, None, &ctx())
            .await
            .expect("setup");
        let secret = outcome.secret.expect("app setup returns the secret");

        let code = self.totp_code(&secret);
        let backup_codes = self
            .engine
            .enable_with_code(user_id, &code, &ctx())
            .await
            .expect("enable");

        (user_id, secret, backup_codes)
    }

    /// Run a full SMS-method enrollment. Returns the user id and the
    /// issued backup codes.
    pub async fn enroll_sms_user(&self) -> (Uuid, Vec<String>) {
        let user_id = Uuid::new_v4();
        self.engine
            .setup(user_id, TwoFactorMethod::Sms, Some(TEST_PHONE.to_string()), &ctx())
            .await
            .expect("setup");

        self.engine
            .send_sms_code(user_id, &ctx())
            .await
            .expect("send sms");
        let code = self.last_sms_code();

        let backup_codes = self
            .engine
            .enable_with_code(user_id, &code, &ctx())
            .await
            .expect("enable");

        (user_id, backup_codes)
    }

    /// The TOTP code valid for `secret` at the harness clock's current time.
    pub fn totp_code(&self, secret: &str) -> String {
        self.engine
            .totp()
            .generate_at(secret, self.clock.now())
            .expect("generate totp")
    }

    /// The code carried by the most recently dispatched mock SMS.
    pub fn last_sms_code(&self) -> String {
        self.sms
            .sent()
            .last()
            .map(|(_, code)| code.clone())
            .expect("an SMS was dispatched")
    }
}

pub fn ctx() -> RequestContext {
    RequestContext {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("integration-tests".to_string()),
    }
}
