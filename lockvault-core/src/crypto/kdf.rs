//! PBKDF2 key derivation for master password processing.
//!
//! Uses PBKDF2-HMAC-SHA256 with:
//! - Iterations: 600,000
//! - Output length: 32 bytes (256 bits)
//! - Salt length: 16 bytes, one per vault

use crate::crypto::cipher::VaultKey;
use crate::crypto::{CryptoError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Iteration count used for every vault key.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Anything below this is rejected outright.
pub const MIN_ITERATIONS: u32 = 1_000;

/// Parameters for PBKDF2 key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Per-vault salt (16 bytes)
    pub salt: [u8; SALT_LEN],

    /// Number of HMAC-SHA256 iterations
    pub iterations: u32,
}

impl KdfParams {
    /// Parameters for an existing salt with the production iteration count
    pub fn new(salt: [u8; SALT_LEN]) -> Self {
        Self {
            salt,
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Override the iteration count
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.iterations < MIN_ITERATIONS {
            return Err(CryptoError::KdfFailed(format!(
                "Iteration count too low (minimum: {})",
                MIN_ITERATIONS
            )));
        }
        Ok(())
    }

    /// Derive the vault key for `password` under these parameters
    pub fn derive(&self, password: &[u8]) -> Result<VaultKey> {
        self.validate()?;

        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, &self.salt, self.iterations, &mut key);

        Ok(VaultKey::from_bytes(key))
    }
}

/// Derive a vault key from the master password and a vault salt.
///
/// Deterministic for a given (password, salt) pair. The iteration count is
/// fixed at [`PBKDF2_ITERATIONS`] so brute-forcing the master password stays
/// expensive.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<VaultKey> {
    KdfParams::new(*salt).derive(password)
}

/// Generate a fresh random salt for a new vault
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 2_000;

    #[test]
    fn test_default_iterations() {
        let params = KdfParams::new([7u8; SALT_LEN]);
        assert_eq!(params.iterations, 600_000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_low_iterations_rejected() {
        let params = KdfParams::new([7u8; SALT_LEN]).with_iterations(10);
        assert!(params.validate().is_err());
        assert!(matches!(
            params.derive(b"password"),
            Err(CryptoError::KdfFailed(_))
        ));
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = generate_salt();

        let key1 = derive_key(b"test_password_123!", &salt).unwrap();
        let key2 = derive_key(b"test_password_123!", &salt).unwrap();

        // Same password and salt should produce the same key
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_inputs_change_key() {
        let params = KdfParams::new(generate_salt()).with_iterations(FAST);
        let key = params.derive(b"password").unwrap();

        // Different password should produce different key
        let other_password = params.derive(b"different_password").unwrap();
        assert_ne!(key.as_bytes(), other_password.as_bytes());

        // Different salt should produce different key
        let mut other = params.clone();
        other.salt = generate_salt();
        let other_salt = other.derive(b"password").unwrap();
        assert_ne!(key.as_bytes(), other_salt.as_bytes());
    }

    #[test]
    fn test_known_vector() {
        // RFC 7914 section 11 PBKDF2-HMAC-SHA256 vector, truncated to 32 bytes.
        let mut out = [0u8; 64];
        pbkdf2::pbkdf2_hmac::<Sha256>(b"passwd", b"salt", 1, &mut out);
        assert_eq!(&out[..4], &[0x55, 0xac, 0x04, 0x6e]);
    }

    #[test]
    fn test_salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
