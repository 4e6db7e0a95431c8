//! Credential-at-rest encryption
//!
//! AES-256-GCM with the raw key material kept in a separate small file next
//! to the snapshot. The key never lives inside the snapshot file itself, so
//! copying the snapshot alone leaks nothing usable.
//!
//! Ciphertext layout: hex(nonce || ct) with a fresh random 96-bit nonce per
//! encryption. Decryption failures of any kind (bad hex, truncated input,
//! tampered tag) surface as `None` upstream - legacy or corrupt records are
//! treated as "no credentials", never as a crash.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use std::fs;
use std::path::Path;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum CryptoError {
    Io(std::io::Error),
    BadKeyFile(String),
    Encrypt(String),
}

impl From<std::io::Error> for CryptoError {
    fn from(err: std::io::Error) -> Self {
        CryptoError::Io(err)
    }
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::Io(e) => write!(f, "IO error: {}", e),
            CryptoError::BadKeyFile(e) => write!(f, "Bad key file: {}", e),
            CryptoError::Encrypt(e) => write!(f, "Encryption error: {}", e),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Symmetric cipher for credential blobs
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl SecretBox {
    /// Load the key file, creating it with fresh random material on first use
    pub fn load_or_create(key_path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let key_path = key_path.as_ref();

        let key_bytes: Vec<u8> = if key_path.exists() {
            let hex_key = fs::read_to_string(key_path)?;
            hex::decode(hex_key.trim())
                .map_err(|e| CryptoError::BadKeyFile(format!("{}: {}", key_path.display(), e)))?
        } else {
            if let Some(parent) = key_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut key = [0u8; KEY_LEN];
            rand::rngs::OsRng.fill_bytes(&mut key);
            fs::write(key_path, hex::encode(key))?;
            log::info!("Generated new credential key file at {}", key_path.display());
            key.to_vec()
        };

        if key_bytes.len() != KEY_LEN {
            return Err(CryptoError::BadKeyFile(format!(
                "expected {} bytes of key material, found {}",
                KEY_LEN,
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| CryptoError::BadKeyFile(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Build a cipher directly from raw key material (tests, embedding hosts)
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new_from_slice(key).expect("32-byte key is always valid"),
        }
    }

    /// Encrypt a plaintext secret into a hex blob
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ct = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ct);
        Ok(hex::encode(blob))
    }

    /// Decrypt a hex blob back to plaintext
    ///
    /// Returns `None` on any failure: malformed hex, missing nonce, failed
    /// authentication tag, or non-UTF-8 plaintext.
    pub fn decrypt(&self, blob: &str) -> Option<String> {
        let bytes = hex::decode(blob.trim()).ok()?;
        if bytes.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ct) = bytes.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), ct).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_box() -> SecretBox {
        SecretBox::from_key(&[7u8; KEY_LEN])
    }

    #[test]
    fn test_round_trip() {
        let sb = test_box();
        let blob = sb.encrypt("user:hunter2").unwrap();
        assert_eq!(sb.decrypt(&blob).unwrap(), "user:hunter2");
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let sb = test_box();
        let a = sb.encrypt("same secret").unwrap();
        let b = sb.encrypt("same secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_returns_none() {
        let sb = test_box();
        let blob = sb.encrypt("user:hunter2").unwrap();

        // Flip one hex digit in the ciphertext body
        let mut chars: Vec<char> = blob.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        assert!(sb.decrypt(&tampered).is_none());
    }

    #[test]
    fn test_garbage_blob_returns_none() {
        let sb = test_box();
        assert!(sb.decrypt("not hex at all").is_none());
        assert!(sb.decrypt("deadbeef").is_none()); // shorter than a nonce
        assert!(sb.decrypt("").is_none());
    }

    #[test]
    fn test_wrong_key_returns_none() {
        let blob = test_box().encrypt("secret").unwrap();
        let other = SecretBox::from_key(&[9u8; KEY_LEN]);
        assert!(other.decrypt(&blob).is_none());
    }

    #[test]
    fn test_key_file_created_and_reloaded() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("test.key");

        let first = SecretBox::load_or_create(&key_path).unwrap();
        let blob = first.encrypt("persisted").unwrap();

        // A second load must read the same key back
        let second = SecretBox::load_or_create(&key_path).unwrap();
        assert_eq!(second.decrypt(&blob).unwrap(), "persisted");
    }

    #[test]
    fn test_truncated_key_file_rejected() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("short.key");
        std::fs::write(&key_path, hex::encode([1u8; 16])).unwrap();
        assert!(SecretBox::load_or_create(&key_path).is_err());
    }
}
