//! AES-256-GCM encryption and decryption for vault payloads.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key derived from the master password
//! - 96-bit (12 byte) nonce, fresh for every call
//! - 128-bit authentication tag appended to the ciphertext

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// The symmetric key a vault is encrypted with.
///
/// Derived from the master password and the vault salt. It lives only in the
/// unlocked session and is wiped when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; 32],
}

impl VaultKey {
    /// Create a key from raw bytes
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create a key from a slice, checking its length
    #[cfg(test)]
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        let key: [u8; 32] = key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            got: key.len(),
        })?;
        Ok(Self { key })
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Output of [`encrypt`]: ciphertext with the tag appended, plus its nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Encrypt data using AES-256-GCM
///
/// Each call draws a new random nonce, so encrypting the same plaintext twice
/// yields different output.
pub fn encrypt(plaintext: &[u8], key: &VaultKey) -> Result<Sealed> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let nonce_bytes: [u8; NONCE_LEN] = nonce.into();

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;

    Ok(Sealed {
        ciphertext,
        nonce: nonce_bytes,
    })
}

/// Decrypt data using AES-256-GCM
///
/// Returns [`CryptoError::DecryptionFailure`] when the tag does not verify,
/// which covers both a wrong key and tampered data.
pub fn decrypt(ciphertext: &[u8], nonce: &[u8], key: &VaultKey) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN || ciphertext.is_empty() {
        return Err(CryptoError::DecryptionFailure);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailure)
}

/// Generate a new random identifier for vaults and entries
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}
