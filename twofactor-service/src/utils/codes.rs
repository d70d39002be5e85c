//! Code and token generation.
//!
//! Everything here draws from the OS CSPRNG. Numeric codes are sampled
//! per-digit with `gen_range`, which is uniform over 0..10.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Charset for backup codes. No 0, O, 1, I to avoid transcription mistakes.
const BACKUP_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a random numeric code of the given length.
pub fn numeric_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length).map(|_| rng.gen_range(0..10u8).to_string()).collect()
}

/// Generate a batch of backup codes. The caller hashes them before
/// persisting; the plaintext leaves this function exactly once.
pub fn backup_code_batch(count: usize, length: usize) -> Vec<String> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| {
            (0..length)
                .map(|_| {
                    let idx = rng.gen_range(0..BACKUP_CHARSET.len());
                    BACKUP_CHARSET[idx] as char
                })
                .collect()
        })
        .collect()
}

/// SHA-256 of a submitted or generated code, hex-encoded.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a user-entered backup code: strip separators, uppercase.
pub fn normalize_backup_code(code: &str) -> String {
    code.replace(['-', ' '], "").to_uppercase()
}

/// High-entropy session token: 32 random bytes, hex-encoded.
pub fn session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_code_has_requested_length_and_only_digits() {
        let code = numeric_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn backup_codes_use_safe_charset() {
        let codes = backup_code_batch(10, 10);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 10);
            assert!(code.bytes().all(|b| BACKUP_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn batches_do_not_repeat() {
        let a = backup_code_batch(10, 10);
        let b = backup_code_batch(10, 10);
        assert!(a.iter().all(|code| !b.contains(code)));
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let h1 = hash_code("123456");
        let h2 = hash_code("123456");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_code("123457"));
    }

    #[test]
    fn normalize_strips_separators() {
        assert_eq!(normalize_backup_code("abcd-efgh"), "ABCDEFGH");
        assert_eq!(normalize_backup_code("AB CD EF"), "ABCDEF");
    }

    #[test]
    fn session_tokens_are_unique_and_long() {
        let t1 = session_token();
        let t2 = session_token();
        assert_eq!(t1.len(), 64);
        assert_ne!(t1, t2);
    }
}
