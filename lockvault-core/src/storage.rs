//! Key-value persistence for registry, vault blobs and remote handles.
//!
//! Every record lives under its own namespaced key (see [`keys`]). Values are
//! opaque bytes; typed records go through [`read_json`] / [`write_json`].

use crate::{Result, VaultError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Storage keys, all derived from the vault identifier where per-vault
pub mod keys {
    use uuid::Uuid;

    pub const REGISTRY: &str = "lockvault_registry";

    /// Single-vault layout predating the registry
    pub const LEGACY_VAULT: &str = "lockvault_encrypted";
    pub const LEGACY_FILE_ID: &str = "lockvault_file_id";

    pub fn vault(id: &Uuid) -> String {
        format!("lockvault_vault_{}", id)
    }

    pub fn file_id(id: &Uuid) -> String {
        format!("lockvault_file_id_{}", id)
    }
}

/// Durable key-value store consumed by the vault engine
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON record
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| VaultError::Serialization(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}

/// Encode and write a JSON record
pub async fn write_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| VaultError::Serialization(e.to_string()))?;
    store.set(key, &bytes).await
}

/// In-memory store, used by tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data.lock().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.data.lock().await.remove(key);
        Ok(())
    }
}

/// Directory-backed store: one file per key.
///
/// Writes go to a temp file that is then renamed over the target, so a crash
/// never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;

            // Owner-only access on Unix
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(VaultError::InvalidInput(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to create {}: {}", key, e)))?;
        file.write_all(value)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to write {}: {}", key, e)))?;
        file.sync_all().await?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to commit {}: {}", key, e)))?;

        debug!(key, bytes = value.len(), "Record written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Storage(format!("Failed to remove {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", b"one").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"one".to_vec()));

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        // Removing again is fine
        store.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let key = keys::vault(&Uuid::new_v4());

        let store = FileStore::open(dir.path()).await.unwrap();
        store.set(&key, b"payload").await.unwrap();
        store.set(&key, b"payload-2").await.unwrap();

        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(&key).await.unwrap(), Some(b"payload-2".to_vec()));

        reopened.remove(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        reopened.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert!(matches!(
            store.set("../escape", b"x").await,
            Err(VaultError::InvalidInput(_))
        ));
        assert!(store.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        write_json(&store, "numbers", &vec![1u32, 2, 3]).await.unwrap();

        let back: Option<Vec<u32>> = read_json(&store, "numbers").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        store.set("broken", b"{").await.unwrap();
        let broken: Result<Option<Vec<u32>>> = read_json(&store, "broken").await;
        assert!(matches!(broken, Err(VaultError::Serialization(_))));
    }

    #[test]
    fn test_keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(
            keys::vault(&id),
            "lockvault_vault_00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            keys::file_id(&id),
            "lockvault_file_id_00000000-0000-0000-0000-000000000000"
        );
    }
}
