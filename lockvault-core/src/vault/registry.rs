//! Registry of vault databases.
//!
//! Every operation takes the current registry by reference and returns a new
//! one, so a rejected operation leaves nothing half-applied. Persistence is a
//! separate step.

use crate::crypto::generate_salt;
use crate::storage::{keys, read_json, write_json, KeyValueStore};
use crate::vault::model::{EncryptedVault, VaultMeta, VaultRegistry};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Name given to the vault recovered from the single-vault layout
pub const LEGACY_VAULT_NAME: &str = "Default Vault";

/// Start a registry holding a single, active vault
pub fn create_registry(first: VaultMeta) -> VaultRegistry {
    VaultRegistry {
        active_vault_id: first.id,
        salt: generate_salt(),
        vaults: vec![first],
    }
}

/// Append a vault and make it active
pub fn add_vault(registry: &VaultRegistry, meta: VaultMeta) -> Result<VaultRegistry> {
    if registry.contains(&meta.id) {
        return Err(VaultError::InvalidInput(format!(
            "Vault {} already registered",
            meta.id
        )));
    }

    let mut next = registry.clone();
    next.active_vault_id = meta.id;
    next.vaults.push(meta);
    Ok(next)
}

pub fn rename_vault(registry: &VaultRegistry, id: &Uuid, name: &str) -> Result<VaultRegistry> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VaultError::InvalidInput(
            "Vault name cannot be empty".to_string(),
        ));
    }

    let mut next = registry.clone();
    let meta = next
        .vaults
        .iter_mut()
        .find(|v| &v.id == id)
        .ok_or(VaultError::UnknownVault(*id))?;
    meta.name = name.to_string();
    Ok(next)
}

/// Remove a vault from the registry.
///
/// The last remaining vault can never be removed. When the active vault goes,
/// the first remaining one becomes active.
pub fn delete_vault(registry: &VaultRegistry, id: &Uuid) -> Result<VaultRegistry> {
    if !registry.contains(id) {
        return Err(VaultError::UnknownVault(*id));
    }
    if registry.vaults.len() <= 1 {
        return Err(VaultError::CannotDeleteLastVault);
    }

    let mut next = registry.clone();
    next.vaults.retain(|v| &v.id != id);
    if &next.active_vault_id == id {
        // Non-empty: checked above
        next.active_vault_id = next.vaults[0].id;
    }
    Ok(next)
}

/// Make `id` the active vault and record the time it was opened
pub fn switch_active(
    registry: &VaultRegistry,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<VaultRegistry> {
    let mut next = registry.clone();
    let meta = next
        .vaults
        .iter_mut()
        .find(|v| &v.id == id)
        .ok_or(VaultError::UnknownVault(*id))?;
    meta.last_opened = now;
    next.active_vault_id = *id;
    Ok(next)
}

pub async fn load_registry(store: &dyn KeyValueStore) -> Result<Option<VaultRegistry>> {
    read_json(store, keys::REGISTRY).await
}

pub async fn save_registry(store: &dyn KeyValueStore, registry: &VaultRegistry) -> Result<()> {
    write_json(store, keys::REGISTRY, registry).await?;
    debug!(vaults = registry.vaults.len(), "Registry saved");
    Ok(())
}

/// Move a single-vault layout into the registry layout.
///
/// Returns the new registry when a migration happened and `None` when there is
/// nothing to migrate (no legacy blob, or a registry already exists). Legacy
/// records left next to an existing registry are stale and get removed.
pub async fn migrate_legacy(store: &dyn KeyValueStore) -> Result<Option<VaultRegistry>> {
    if load_registry(store).await?.is_some() {
        remove_legacy_records(store).await?;
        return Ok(None);
    }

    let Some(blob) = store.get(keys::LEGACY_VAULT).await? else {
        return Ok(None);
    };
    let legacy: EncryptedVault = serde_json::from_slice(&blob)
        .map_err(|e| VaultError::MalformedVault(format!("legacy vault record: {}", e)))?;

    // The inner vault id is encrypted, so the registry gets a fresh one
    let id = Uuid::new_v4();
    store.set(&keys::vault(&id), &blob).await?;

    if let Some(handle) = store.get(keys::LEGACY_FILE_ID).await? {
        store.set(&keys::file_id(&id), &handle).await?;
    }

    let meta = VaultMeta::new(id, LEGACY_VAULT_NAME, legacy.last_updated);
    let mut registry = create_registry(meta);
    registry.salt = legacy.salt;
    save_registry(store, &registry).await?;
    remove_legacy_records(store).await?;

    info!(vault_id = %id, "Migrated legacy vault into registry");
    Ok(Some(registry))
}

async fn remove_legacy_records(store: &dyn KeyValueStore) -> Result<()> {
    if store.get(keys::LEGACY_VAULT).await?.is_some() {
        debug!("Removing legacy vault record");
        store.remove(keys::LEGACY_VAULT).await?;
    }
    store.remove(keys::LEGACY_FILE_ID).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn meta(name: &str) -> VaultMeta {
        VaultMeta::new(Uuid::new_v4(), name, Utc::now())
    }

    fn registry_of(names: &[&str]) -> VaultRegistry {
        let mut reg = create_registry(meta(names[0]));
        for name in &names[1..] {
            reg = add_vault(&reg, meta(name)).unwrap();
        }
        reg
    }

    #[test]
    fn test_create_registry() {
        let first = meta("My Vault");
        let reg = create_registry(first.clone());
        assert_eq!(reg.active_vault_id, first.id);
        assert_eq!(reg.vaults, vec![first]);
    }

    #[test]
    fn test_add_vault_becomes_active() {
        let reg = registry_of(&["A"]);
        let b = meta("B");
        let next = add_vault(&reg, b.clone()).unwrap();

        assert_eq!(next.vaults.len(), 2);
        assert_eq!(next.active_vault_id, b.id);
        assert_eq!(next.vaults[1], b);
        // Input untouched
        assert_eq!(reg.vaults.len(), 1);
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let first = meta("A");
        let reg = create_registry(first.clone());
        assert!(matches!(
            add_vault(&reg, first),
            Err(VaultError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rename_vault() {
        let reg = registry_of(&["A", "B"]);
        let id = reg.vaults[0].id;

        let next = rename_vault(&reg, &id, "  Work  ").unwrap();
        assert_eq!(next.find(&id).unwrap().name, "Work");

        assert!(matches!(
            rename_vault(&reg, &id, "   "),
            Err(VaultError::InvalidInput(_))
        ));

        let stranger = Uuid::new_v4();
        assert!(matches!(
            rename_vault(&reg, &stranger, "X"),
            Err(VaultError::UnknownVault(v)) if v == stranger
        ));
    }

    #[test]
    fn test_delete_last_vault_forbidden() {
        let reg = registry_of(&["Only"]);
        let id = reg.vaults[0].id;

        assert!(matches!(
            delete_vault(&reg, &id),
            Err(VaultError::CannotDeleteLastVault)
        ));
        assert_eq!(reg.vaults.len(), 1);
    }

    #[test]
    fn test_delete_active_reassigns_first_remaining() {
        let reg = registry_of(&["A", "B", "C"]);
        let c = reg.vaults[2].id;
        assert_eq!(reg.active_vault_id, c);

        let next = delete_vault(&reg, &c).unwrap();
        assert_eq!(next.vaults.len(), 2);
        assert_eq!(next.active_vault_id, reg.vaults[0].id);
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let reg = registry_of(&["A", "B"]);
        let next = delete_vault(&reg, &reg.vaults[0].id).unwrap();
        assert_eq!(next.active_vault_id, reg.active_vault_id);
        assert!(matches!(
            delete_vault(&next, &Uuid::new_v4()),
            Err(VaultError::UnknownVault(_))
        ));
    }

    #[test]
    fn test_switch_active_touches_last_opened() {
        let reg = registry_of(&["A", "B"]);
        let a = reg.vaults[0].id;
        let later = Utc::now() + chrono::Duration::minutes(5);

        let next = switch_active(&reg, &a, later).unwrap();
        assert_eq!(next.active_vault_id, a);
        assert_eq!(next.find(&a).unwrap().last_opened, later);

        assert!(switch_active(&reg, &Uuid::new_v4(), later).is_err());
    }

    #[tokio::test]
    async fn test_registry_persistence() {
        let store = MemoryStore::new();
        assert!(load_registry(&store).await.unwrap().is_none());

        let reg = registry_of(&["A", "B"]);
        save_registry(&store, &reg).await.unwrap();
        assert_eq!(load_registry(&store).await.unwrap(), Some(reg));
    }

    async fn seed_legacy(store: &MemoryStore) -> Vec<u8> {
        let legacy = EncryptedVault {
            ciphertext: vec![7u8; 40],
            iv: vec![1u8; 12],
            salt: [3u8; 16],
            last_updated: Utc::now(),
        };
        let blob = serde_json::to_vec(&legacy).unwrap();
        store.set(keys::LEGACY_VAULT, &blob).await.unwrap();
        store.set(keys::LEGACY_FILE_ID, b"remote-handle").await.unwrap();
        blob
    }

    #[tokio::test]
    async fn test_migrate_legacy_layout() {
        let store = MemoryStore::new();
        let blob = seed_legacy(&store).await;

        let reg = migrate_legacy(&store).await.unwrap().unwrap();
        assert_eq!(reg.vaults.len(), 1);
        assert_eq!(reg.vaults[0].name, LEGACY_VAULT_NAME);

        let id = reg.active_vault_id;
        assert_eq!(store.get(&keys::vault(&id)).await.unwrap(), Some(blob));
        assert_eq!(
            store.get(&keys::file_id(&id)).await.unwrap(),
            Some(b"remote-handle".to_vec())
        );
        assert!(store.get(keys::LEGACY_VAULT).await.unwrap().is_none());
        assert!(store.get(keys::LEGACY_FILE_ID).await.unwrap().is_none());
        assert_eq!(load_registry(&store).await.unwrap(), Some(reg.clone()));

        // Second run changes nothing
        assert!(migrate_legacy(&store).await.unwrap().is_none());
        assert_eq!(load_registry(&store).await.unwrap(), Some(reg));
    }

    #[tokio::test]
    async fn test_migrate_drops_legacy_records_beside_registry() {
        let store = MemoryStore::new();
        let reg = registry_of(&["A"]);
        save_registry(&store, &reg).await.unwrap();
        seed_legacy(&store).await;

        assert!(migrate_legacy(&store).await.unwrap().is_none());
        assert!(store.get(keys::LEGACY_VAULT).await.unwrap().is_none());
        assert!(store.get(keys::LEGACY_FILE_ID).await.unwrap().is_none());
        assert_eq!(load_registry(&store).await.unwrap(), Some(reg));
    }

    #[tokio::test]
    async fn test_migrate_without_legacy_data() {
        let store = MemoryStore::new();
        assert!(migrate_legacy(&store).await.unwrap().is_none());
        assert!(store.keys().await.is_empty());
    }
}
