pub mod backup_code;
pub mod temp_session;
pub mod two_factor_settings;
pub mod verification_attempt;

pub use backup_code::BackupCode;
pub use temp_session::{LoginData, TempSession};
pub use two_factor_settings::{TwoFactorMethod, TwoFactorSettings, TwoFactorState};
pub use verification_attempt::{
    FailureReason, RequestContext, VerificationAttempt, VerificationChannel,
};
