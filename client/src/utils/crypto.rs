//! String encryption/decryption using AES-256-GCM with direct key support.
//!
//! Used to keep a persisted session unreadable on disk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let crypto = StringCrypto::new(&key)?;
//! let encrypted = crypto.encrypt("secret data")?;
//! let decrypted = crypto.decrypt(&encrypted)?;
//! ```

use aes_gcm::aead::rand_core::{OsRng, RngCore};
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid encryption key")]
    InvalidKey,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid data format")]
    InvalidData,
}

/// AES-256-GCM encryption/decryption for strings.
pub struct StringCrypto {
    cipher: Aes256Gcm,
}

impl StringCrypto {
    /// Create a cipher from a key string.
    ///
    /// A 44-character key is treated as base64 of 32 bytes; anything else is
    /// used as raw bytes, zero-padded or truncated to 32.
    pub fn new(key_str: &str) -> Result<Self, CryptoError> {
        let key_bytes = if key_str.len() == 44 {
            general_purpose::STANDARD
                .decode(key_str)
                .map_err(|_| CryptoError::InvalidKey)?
        } else {
            let mut bytes = vec![0u8; 32];
            let input_bytes = key_str.as_bytes();
            let copy_len = std::cmp::min(input_bytes.len(), 32);
            bytes[..copy_len].copy_from_slice(&input_bytes[..copy_len]);
            bytes
        };

        if key_str.is_empty() || key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a string and return base64 of nonce || ciphertext.
    /// Each encryption uses a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(result))
    }

    /// Decrypt a string produced by [`StringCrypto::encrypt`].
    pub fn decrypt(&self, encrypted_data: &str) -> Result<String, CryptoError> {
        let data = general_purpose::STANDARD
            .decode(encrypted_data.trim())
            .map_err(|_| CryptoError::InvalidData)?;

        if data.len() < NONCE_LEN {
            return Err(CryptoError::InvalidData);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidData)
    }
}

/// Generate a new base64-encoded 256-bit encryption key.
pub fn generate_key() -> String {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    general_purpose::STANDARD.encode(key)
}
