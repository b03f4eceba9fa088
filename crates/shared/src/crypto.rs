//! At-rest encryption for account credentials (spec.md 3, 6).
//!
//! Scheme: AES-256-GCM, a random 96-bit nonce per write, stored as
//! `nonce(12) || ciphertext`. The key is a 32-byte file loaded once at
//! startup into a process-wide [`EncryptionManager`], matching spec.md 5's
//! "process-scoped service handle" guidance for what the source system
//! modeled as module-global mutable state.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be at least {KEY_LEN} bytes, got {0}")]
    KeyTooShort(usize),
    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,
    #[error("AEAD operation failed")]
    Aead,
    #[error("decrypted payload was not valid UTF-8")]
    InvalidUtf8,
}

/// Handles encryption/decryption of account credential tokens.
#[derive(Clone)]
pub struct EncryptionManager {
    cipher: Aes256Gcm,
}

impl EncryptionManager {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() < KEY_LEN {
            return Err(CryptoError::KeyTooShort(key.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key[..KEY_LEN]);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt plaintext, returning `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Aead)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, encrypted: &[u8]) -> Result<String, CryptoError> {
        if encrypted.len() < NONCE_LEN {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Aead)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    pub fn encrypt_to_base64(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.encrypt(plaintext)?))
    }

    pub fn decrypt_from_base64(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::CiphertextTooShort)?;
        self.decrypt(&bytes)
    }
}

/// Load the 32-byte key from disk. Strips trailing `\n`/`\r` only (a text
/// editor may add a trailing newline when the key was pasted in), never a
/// general whitespace trim, since that could silently corrupt a binary key.
pub fn load_key_file(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let mut key = std::fs::read(path)?;
    while matches!(key.last(), Some(b'\n') | Some(b'\r')) {
        key.pop();
    }
    Ok(key)
}

pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Constant-time byte comparison, used to compare the webhook channel's
/// shared-secret token (spec.md 6) without leaking timing information about
/// how many leading bytes matched.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = generate_key();
        let mgr = EncryptionManager::new(&key).unwrap();
        let ciphertext = mgr.encrypt("refresh-token-value").unwrap();
        assert_eq!(mgr.decrypt(&ciphertext).unwrap(), "refresh-token-value");
    }

    #[test]
    fn nonce_is_randomized_per_write() {
        let key = generate_key();
        let mgr = EncryptionManager::new(&key).unwrap();
        let a = mgr.encrypt("same-plaintext").unwrap();
        let b = mgr.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_key() {
        assert!(EncryptionManager::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn constant_time_eq_matches() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
        assert!(!constant_time_eq(b"abc123", b"abc124"));
        assert!(!constant_time_eq(b"short", b"longer-value"));
    }
}
