//! TOTP enrollment and verification (RFC 6238).

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use totp_rs::{Algorithm, Secret, TOTP};

/// RFC 6238 defaults, matched to what authenticator apps expect.
#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Issuer shown in authenticator apps.
    pub issuer: String,
    pub digits: usize,
    pub step_seconds: u64,
    /// Accepted steps either side of now. Two steps tolerates ±60s of clock
    /// drift; a deliberate usability/security trade-off.
    pub skew: u8,
}

impl TotpConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            digits: 6,
            step_seconds: 30,
            skew: 2,
        }
    }
}

/// Enrollment data returned to the caller exactly once. The dashboard
/// renders a QR code from the URI.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    /// Base32-encoded seed secret.
    pub secret: String,
    /// otpauth:// URI for QR rendering or manual entry.
    pub otpauth_uri: String,
}

#[derive(Debug, Clone)]
pub struct TotpVerifier {
    config: TotpConfig,
}

impl TotpVerifier {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh secret and its provisioning URI for a user.
    pub fn enroll(&self, account_label: &str) -> Result<TotpEnrollment, AppError> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build(&secret_base32, account_label)?;

        Ok(TotpEnrollment {
            secret: secret_base32,
            otpauth_uri: totp.get_url(),
        })
    }

    /// Check a submitted code against a secret at a given instant.
    ///
    /// A wrong code is an ordinary `false`; only a malformed secret is an
    /// error.
    pub fn verify_at(
        &self,
        secret_base32: &str,
        code: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let code = code.replace([' ', '-'], "");
        if code.len() != self.config.digits || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.build(secret_base32, "")?;
        Ok(totp.check(&code, at.timestamp() as u64))
    }

    /// Generate the code valid at a given instant. Used by the login
    /// simulator and tests; never exposed over HTTP.
    pub fn generate_at(&self, secret_base32: &str, at: DateTime<Utc>) -> Result<String, AppError> {
        let totp = self.build(secret_base32, "")?;
        Ok(totp.generate(at.timestamp() as u64))
    }

    fn build(&self, secret_base32: &str, account_label: &str) -> Result<TOTP, AppError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| {
                AppError::DependencyError(anyhow::anyhow!("Invalid TOTP secret: {:?}", e))
            })?;

        TOTP::new(
            Algorithm::SHA1,
            self.config.digits,
            self.config.skew,
            self.config.step_seconds,
            secret_bytes,
            Some(self.config.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to build TOTP: {}", e)))
    }
}
