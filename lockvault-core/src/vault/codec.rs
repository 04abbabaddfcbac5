//! Vault codec: turns a [`Vault`] into its encrypted at-rest form and back.

use crate::crypto::{decrypt, encrypt, VaultKey};
use crate::storage::{keys, read_json, write_json, KeyValueStore};
use crate::vault::model::{EncryptedVault, Vault};
use crate::{Result, VaultError};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroize;

/// Serialize and encrypt a vault.
///
/// The salt and `last_updated` are copied into cleartext next to the
/// ciphertext so staleness checks and key derivation need no decryption.
pub fn seal(vault: &Vault, key: &VaultKey) -> Result<EncryptedVault> {
    let mut plaintext =
        bincode::serialize(vault).map_err(|e| VaultError::Serialization(e.to_string()))?;
    let sealed = encrypt(&plaintext, key);
    plaintext.zeroize();
    let sealed = sealed?;

    Ok(EncryptedVault {
        ciphertext: sealed.ciphertext,
        iv: sealed.nonce.to_vec(),
        salt: vault.salt,
        last_updated: vault.last_updated,
    })
}

/// Decrypt and deserialize a vault.
///
/// A failed tag check comes back as `CryptoError::DecryptionFailure`. Plaintext
/// that authenticates but does not decode is reported as
/// [`VaultError::MalformedVault`].
pub fn open(encrypted: &EncryptedVault, key: &VaultKey) -> Result<Vault> {
    let mut plaintext = decrypt(&encrypted.ciphertext, &encrypted.iv, key)?;
    let vault =
        bincode::deserialize(&plaintext).map_err(|e| VaultError::MalformedVault(e.to_string()));
    plaintext.zeroize();
    vault
}

/// Render an encrypted vault as the readable JSON backup format
pub fn to_export_text(encrypted: &EncryptedVault) -> Result<String> {
    serde_json::to_string_pretty(encrypted).map_err(|e| VaultError::Serialization(e.to_string()))
}

/// Parse the JSON backup format (or a persisted record)
pub fn from_export_text(text: &str) -> Result<EncryptedVault> {
    serde_json::from_str(text).map_err(|e| VaultError::MalformedVault(e.to_string()))
}

/// Seal a vault and write it under its per-vault key
pub async fn store_vault(
    store: &dyn KeyValueStore,
    vault: &Vault,
    key: &VaultKey,
) -> Result<EncryptedVault> {
    let encrypted = seal(vault, key)?;
    write_json(store, &keys::vault(&vault.vault_id), &encrypted).await?;
    debug!(vault_id = %vault.vault_id, version = vault.version, "Vault persisted");
    Ok(encrypted)
}

/// Read the persisted at-rest record of a vault.
///
/// A record that is present but unparsable is reported as malformed.
pub async fn load_encrypted(
    store: &dyn KeyValueStore,
    id: &Uuid,
) -> Result<Option<EncryptedVault>> {
    read_json(store, &keys::vault(id)).await.map_err(|e| match e {
        VaultError::Serialization(msg) => VaultError::MalformedVault(msg),
        other => other,
    })
}
