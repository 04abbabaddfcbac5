//! LockVault Core Library
//!
//! Local-first encrypted credential vaults: key derivation, authenticated
//! encryption of vault contents, a registry of named vault databases, and a
//! last-writer-wins reconciliation against a remote copy.

pub mod config;
pub mod crypto;
pub mod import;
pub mod platform;
pub mod remote;
pub mod session;
pub mod storage;
pub mod sync;
pub mod vault;

pub use config::Config;
pub use crypto::{
    derive_key, generate_password, generate_salt, CryptoError, PasswordOptions, VaultKey,
};
pub use import::{import_from_csv, CsvImport, CsvSource};
pub use remote::{
    AccessToken, DirectoryRemote, MemoryRemote, NoToken, RemoteStore, StaticToken, TokenProvider,
};
pub use session::{handle_shared, Command, CommandResponse, Session};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{SyncAction, SyncEngine, SyncOutcome, SyncPlan, SyncStatus};
pub use vault::{Category, EncryptedVault, Vault, VaultEntry, VaultMeta, VaultRegistry};

use thiserror::Error;
use uuid::Uuid;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// General error type for vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Invalid master password or corrupted vault")]
    InvalidCredentials,

    #[error("Vault data is malformed: {0}")]
    MalformedVault(String),

    #[error("Vault is locked")]
    VaultLocked,

    #[error("No vault found. Please set up a new vault first")]
    NoVault,

    #[error("Unknown vault: {0}")]
    UnknownVault(Uuid),

    #[error("Cannot delete the last remaining vault")]
    CannotDeleteLastVault,

    #[error("Entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Sync failed: {0}")]
    SyncFailure(String),

    #[error("Remote storage unavailable during setup: {0}")]
    SetupOffline(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Stable error-kind string reported to command-protocol callers.
    ///
    /// A decryption failure is reported exactly like a wrong password.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crypto(CryptoError::DecryptionFailure) | Self::InvalidCredentials => {
                "INVALID_CREDENTIALS"
            }
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::MalformedVault(_) => "MALFORMED_VAULT",
            Self::VaultLocked => "VAULT_LOCKED",
            Self::NoVault => "NO_VAULT",
            Self::UnknownVault(_) => "UNKNOWN_VAULT",
            Self::CannotDeleteLastVault => "CANNOT_DELETE_LAST_VAULT",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::SyncFailure(_) => "SYNC_FAILURE",
            Self::SetupOffline(_) => "SETUP_OFFLINE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage(_) | Self::Io(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}
