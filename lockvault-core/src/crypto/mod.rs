//! Cryptographic primitives for the vault engine.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 key derivation
//! - AES-256-GCM encryption/decryption
//! - Secure random salts, nonces and identifiers
//! - Password generation

pub mod cipher;
pub mod kdf;
pub mod password;

pub use cipher::{decrypt, encrypt, new_id, Sealed, VaultKey};
pub use kdf::{derive_key, generate_salt, KdfParams, PBKDF2_ITERATIONS, SALT_LEN};
pub use password::{calculate_entropy, generate_password, strength_label, PasswordOptions};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The authentication tag did not verify. Wrong key and tampered
    /// ciphertext are indistinguishable here.
    #[error("Decryption failed. Incorrect master password or corrupted data")]
    DecryptionFailure,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
