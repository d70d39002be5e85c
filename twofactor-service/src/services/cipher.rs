//! Encryption of TOTP seed secrets at rest.
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call and the fixed
//! context string bound as AAD, so a blob lifted from this table cannot be
//! replayed into another decryption context. The key is derived once from
//! the configured master key with Argon2id over a fixed salt.
//!
//! Storage format: `[12 bytes nonce][ciphertext + 16-byte auth tag]`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use service_core::error::AppError;

/// AAD context tag for 2FA seed secrets.
const SECRET_CONTEXT: &[u8] = b"2fa-secret";

/// Fixed KDF salt. Versioned so a future format change can re-derive.
const KDF_SALT: &[u8] = b"twofactor/secret-cipher/v1";

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive the cipher key from the configured master key.
    pub fn new(master_key: &str) -> Result<Self, AppError> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(master_key.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Key derivation failed: {}", e)))?;
        Ok(Self { key })
    }

    /// Encrypt a plaintext secret, producing a self-contained blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid cipher key: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: SECRET_CONTEXT,
                },
            )
            .map_err(|_| AppError::DependencyError(anyhow::anyhow!("Secret encryption failed")))?;

        let mut blob = nonce_bytes.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a stored blob. Tag mismatch, truncation, or garbage all
    /// surface as a dependency failure; there is no partial trust.
    pub fn decrypt(&self, blob: &[u8]) -> Result<String, AppError> {
        if blob.len() < NONCE_LEN {
            return Err(AppError::DependencyError(anyhow::anyhow!(
                "Stored secret is truncated"
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid cipher key: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&blob[..NONCE_LEN]);
        let nonce = Nonce::from(nonce_bytes);

        let plaintext = cipher
            .decrypt(
                &nonce,
                Payload {
                    msg: &blob[NONCE_LEN..],
                    aad: SECRET_CONTEXT,
                },
            )
            .map_err(|_| {
                tracing::error!("Stored 2FA secret failed authentication (wrong key or tampering)");
                AppError::DependencyError(anyhow::anyhow!("Secret decryption failed"))
            })?;

        String::from_utf8(plaintext).map_err(|_| {
            AppError::DependencyError(anyhow::anyhow!("Decrypted secret is not valid UTF-8"))
        })
    }
}
