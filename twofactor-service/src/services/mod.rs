//! Services layer for the two-factor service.

pub mod attempts;
pub mod audit;
pub mod channel;
pub mod cipher;
pub mod clock;
pub mod database;
pub mod engine;
pub mod memory;
pub mod sessions;
pub mod sms;
pub mod store;
pub mod totp;

pub use audit::{AuditEvent, AuditEventType, AuditSink, CapturingAuditSink, TracingAuditSink};
pub use cipher::SecretCipher;
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::PostgresStore;
pub use engine::{
    CleanupReport, EnginePolicy, LoginChallenge, SetupOutcome, SmsDispatch, TwoFactorEngine,
    TwoFactorStatus,
};
pub use memory::MemoryStore;
pub use sms::{FailingSmsProvider, HttpSmsProvider, MockSmsProvider, SmsProvider};
pub use store::TwoFactorStore;
pub use totp::{TotpConfig, TotpEnrollment, TotpVerifier};
