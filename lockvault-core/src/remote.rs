//! Remote object store and access-token collaborators used by sync.
//!
//! The engine only needs a handful of file operations keyed by name and
//! opaque handle; any cloud drive or mounted folder can sit behind them.

use crate::{Result, VaultError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Remote object name for a vault
pub fn remote_file_name(vault_id: &Uuid) -> String {
    format!("{}.vault.enc", vault_id)
}

/// Bearer credential for the remote store
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// A located remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub handle: String,
    pub modified_time: DateTime<Utc>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn find(&self, name: &str, token: &AccessToken) -> Result<Option<RemoteFile>>;
    /// Look up an object by handle; `None` once it has been removed
    async fn stat(&self, handle: &str, token: &AccessToken) -> Result<Option<RemoteFile>>;
    async fn download(&self, handle: &str, token: &AccessToken) -> Result<Vec<u8>>;
    /// Create a new object, returning its handle
    async fn upload_new(&self, name: &str, content: &[u8], token: &AccessToken)
        -> Result<String>;
    async fn upload_overwrite(&self, handle: &str, content: &[u8], token: &AccessToken)
        -> Result<()>;
    async fn delete(&self, handle: &str, token: &AccessToken) -> Result<()>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token obtainable without user interaction, if any
    async fn token_silent(&self) -> Option<AccessToken>;

    /// A token, prompting the user if needed
    async fn token_interactive(&self) -> Result<AccessToken>;
}

/// Offline mode: never yields a token
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn token_silent(&self) -> Option<AccessToken> {
        None
    }

    async fn token_interactive(&self) -> Result<AccessToken> {
        Err(VaultError::SyncFailure("No remote account configured".to_string()))
    }
}

/// Always yields the same token
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(AccessToken::new(token))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token_silent(&self) -> Option<AccessToken> {
        Some(self.0.clone())
    }

    async fn token_interactive(&self) -> Result<AccessToken> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    name: String,
    content: Vec<u8>,
    modified_time: DateTime<Utc>,
}

/// In-process remote, used by tests.
///
/// Can be switched offline, and given artificial latency to exercise timeouts.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    objects: Mutex<HashMap<String, StoredObject>>,
    offline: AtomicBool,
    read_only: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Keep serving reads but fail every upload
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().await = latency;
    }

    /// Place an object directly, bypassing the store API
    pub async fn put(
        &self,
        name: &str,
        content: Vec<u8>,
        modified_time: DateTime<Utc>,
    ) -> String {
        let handle = Uuid::new_v4().to_string();
        self.objects.lock().await.insert(
            handle.clone(),
            StoredObject {
                name: name.to_string(),
                content,
                modified_time,
            },
        );
        handle
    }

    /// Content of the object named `name`, if present
    pub async fn content_of(&self, name: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .await
            .values()
            .find(|o| o.name == name)
            .map(|o| o.content.clone())
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn reach(&self) -> Result<()> {
        let latency = *self.latency.lock().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(VaultError::SyncFailure("Remote unreachable".to_string()));
        }
        Ok(())
    }

    async fn reach_for_write(&self) -> Result<()> {
        self.reach().await?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(VaultError::SyncFailure("Remote is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn find(&self, name: &str, _token: &AccessToken) -> Result<Option<RemoteFile>> {
        self.reach().await?;
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .find(|(_, o)| o.name == name)
            .map(|(handle, o)| RemoteFile {
                handle: handle.clone(),
                modified_time: o.modified_time,
            }))
    }

    async fn stat(&self, handle: &str, _token: &AccessToken) -> Result<Option<RemoteFile>> {
        self.reach().await?;
        Ok(self.objects.lock().await.get(handle).map(|o| RemoteFile {
            handle: handle.to_string(),
            modified_time: o.modified_time,
        }))
    }

    async fn download(&self, handle: &str, _token: &AccessToken) -> Result<Vec<u8>> {
        self.reach().await?;
        self.objects
            .lock()
            .await
            .get(handle)
            .map(|o| o.content.clone())
            .ok_or_else(|| VaultError::SyncFailure(format!("Remote object {} not found", handle)))
    }

    async fn upload_new(
        &self,
        name: &str,
        content: &[u8],
        _token: &AccessToken,
    ) -> Result<String> {
        self.reach_for_write().await?;
        Ok(self.put(name, content.to_vec(), Utc::now()).await)
    }

    async fn upload_overwrite(
        &self,
        handle: &str,
        content: &[u8],
        _token: &AccessToken,
    ) -> Result<()> {
        self.reach_for_write().await?;
        let mut objects = self.objects.lock().await;
        let object = objects
            .get_mut(handle)
            .ok_or_else(|| VaultError::SyncFailure(format!("Remote object {} not found", handle)))?;
        object.content = content.to_vec();
        object.modified_time = Utc::now();
        Ok(())
    }

    async fn delete(&self, handle: &str, _token: &AccessToken) -> Result<()> {
        self.reach_for_write().await?;
        self.objects.lock().await.remove(handle);
        Ok(())
    }
}

/// A folder standing in for the remote drive (a mounted share, a synced
/// directory). The handle is the file name.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, handle: &str) -> Result<PathBuf> {
        if handle.is_empty() || handle.contains(['/', '\\']) || handle.starts_with('.') {
            return Err(VaultError::SyncFailure(format!(
                "Invalid remote handle: {:?}",
                handle
            )));
        }
        Ok(self.root.join(handle))
    }
}

fn remote_io(op: &str, e: std::io::Error) -> VaultError {
    VaultError::SyncFailure(format!("{} failed: {}", op, e))
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn find(&self, name: &str, token: &AccessToken) -> Result<Option<RemoteFile>> {
        self.stat(name, token).await
    }

    async fn stat(&self, handle: &str, _token: &AccessToken) -> Result<Option<RemoteFile>> {
        let path = self.path_for(handle)?;
        match fs::metadata(&path).await {
            Ok(meta) => {
                let modified = meta.modified().map_err(|e| remote_io("stat", e))?;
                Ok(Some(RemoteFile {
                    handle: handle.to_string(),
                    modified_time: DateTime::<Utc>::from(modified),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(remote_io("stat", e)),
        }
    }

    async fn download(&self, handle: &str, _token: &AccessToken) -> Result<Vec<u8>> {
        fs::read(self.path_for(handle)?)
            .await
            .map_err(|e| remote_io("download", e))
    }

    async fn upload_new(
        &self,
        name: &str,
        content: &[u8],
        _token: &AccessToken,
    ) -> Result<String> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| remote_io("upload", e))?;
        fs::write(self.path_for(name)?, content)
            .await
            .map_err(|e| remote_io("upload", e))?;
        Ok(name.to_string())
    }

    async fn upload_overwrite(
        &self,
        handle: &str,
        content: &[u8],
        _token: &AccessToken,
    ) -> Result<()> {
        let path = self.path_for(handle)?;
        if !fs::try_exists(&path).await.map_err(|e| remote_io("upload", e))? {
            return Err(VaultError::SyncFailure(format!("Remote object {} not found", handle)));
        }
        fs::write(path, content)
            .await
            .map_err(|e| remote_io("upload", e))
    }

    async fn delete(&self, handle: &str, _token: &AccessToken) -> Result<()> {
        match fs::remove_file(self.path_for(handle)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(remote_io("delete", e)),
        }
    }
}
