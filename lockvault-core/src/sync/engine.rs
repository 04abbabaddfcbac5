//! Sync engine: locate, create, push or reconcile one vault against its remote copy.

use crate::crypto::VaultKey;
use crate::remote::{remote_file_name, AccessToken, RemoteFile, RemoteStore};
use crate::storage::{keys, KeyValueStore};
use crate::sync::conflict::merge;
use crate::vault::codec::{from_export_text, open, seal, store_vault};
use crate::vault::model::Vault;
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Default bound on each remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Which branch of the sync state machine ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// No remote copy existed; one was uploaded
    CreateRemote,
    /// Remote copy was not newer; local overwrote it
    PushLocal,
    /// Remote copy was newer; both were merged
    Reconcile,
}

/// Result of syncing one vault
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The vault as it now stands locally and remotely
    pub vault: Vault,
    pub merged: bool,
    pub action: SyncAction,
}

/// User-visible sync indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Syncing,
    #[default]
    Offline,
    Conflict,
    Error,
}

/// What a sync will do, decided from the remote copy alone.
///
/// Planning only reads from the remote, so it can run against a snapshot while
/// the vault stays usable. [`SyncEngine::apply`] then performs the writes.
#[derive(Debug, Clone)]
pub enum SyncPlan {
    CreateRemote,
    PushLocal { handle: String },
    Reconcile { handle: String, remote: Vault },
}

impl SyncPlan {
    pub fn action(&self) -> SyncAction {
        match self {
            Self::CreateRemote => SyncAction::CreateRemote,
            Self::PushLocal { .. } => SyncAction::PushLocal,
            Self::Reconcile { .. } => SyncAction::Reconcile,
        }
    }
}

/// Orchestrates one vault's sync against the remote store.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            remote,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reconcile `vault` with its remote copy: [`plan`](Self::plan) then
    /// [`apply`](Self::apply).
    pub async fn sync_vault(
        &self,
        vault: &Vault,
        key: &VaultKey,
        token: &AccessToken,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        let plan = self.plan(vault, key, token).await?;
        self.apply(plan, vault, key, token, now).await
    }

    /// Locate the remote copy and, when it is newer than `vault`, download and
    /// open it. Nothing is written.
    pub async fn plan(
        &self,
        vault: &Vault,
        key: &VaultKey,
        token: &AccessToken,
    ) -> Result<SyncPlan> {
        let Some(remote_file) = self.locate(&vault.vault_id, token).await? else {
            debug!(vault_id = %vault.vault_id, "No remote copy");
            return Ok(SyncPlan::CreateRemote);
        };

        if remote_file.modified_time <= vault.last_updated {
            debug!(vault_id = %vault.vault_id, "Remote copy not newer");
            return Ok(SyncPlan::PushLocal {
                handle: remote_file.handle,
            });
        }

        debug!(vault_id = %vault.vault_id, "Remote copy newer, downloading");
        let bytes = self
            .bounded("download", self.remote.download(&remote_file.handle, token))
            .await?;
        let text = String::from_utf8(bytes)
            .map_err(|_| VaultError::SyncFailure("Remote copy is not valid UTF-8".to_string()))?;
        let remote_encrypted = from_export_text(&text).map_err(|e| {
            VaultError::SyncFailure(format!("Remote copy is not a vault record: {}", e))
        })?;
        let remote = open(&remote_encrypted, key).map_err(|e| {
            VaultError::SyncFailure(format!("Remote copy could not be opened: {}", e))
        })?;

        Ok(SyncPlan::Reconcile {
            handle: remote_file.handle,
            remote,
        })
    }

    /// Carry out a plan for `vault`.
    ///
    /// On the reconcile branch the merged vault is persisted locally before it
    /// is uploaded. Local writes are never rolled back when a later remote call
    /// fails.
    pub async fn apply(
        &self,
        plan: SyncPlan,
        vault: &Vault,
        key: &VaultKey,
        token: &AccessToken,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        match plan {
            SyncPlan::CreateRemote => {
                let name = remote_file_name(&vault.vault_id);
                let body = self.sealed_body(vault, key)?;
                let handle = self
                    .bounded("upload", self.remote.upload_new(&name, &body, token))
                    .await?;
                self.record_handle(&vault.vault_id, &handle).await?;
                Ok(SyncOutcome {
                    vault: vault.clone(),
                    merged: false,
                    action: SyncAction::CreateRemote,
                })
            }
            SyncPlan::PushLocal { handle } => {
                let body = self.sealed_body(vault, key)?;
                self.bounded("upload", self.remote.upload_overwrite(&handle, &body, token))
                    .await?;
                self.record_handle(&vault.vault_id, &handle).await?;
                Ok(SyncOutcome {
                    vault: vault.clone(),
                    merged: false,
                    action: SyncAction::PushLocal,
                })
            }
            SyncPlan::Reconcile { handle, remote } => {
                let merged = merge(vault, &remote, now);
                let encrypted = store_vault(self.store.as_ref(), &merged, key).await?;

                let body = serde_json::to_vec(&encrypted)
                    .map_err(|e| VaultError::Serialization(e.to_string()))?;
                self.bounded("upload", self.remote.upload_overwrite(&handle, &body, token))
                    .await?;
                self.record_handle(&vault.vault_id, &handle).await?;

                info!(
                    vault_id = %vault.vault_id,
                    version = merged.version,
                    entries = merged.entries.len(),
                    "Vault reconciled with remote copy"
                );
                Ok(SyncOutcome {
                    vault: merged,
                    merged: true,
                    action: SyncAction::Reconcile,
                })
            }
        }
    }

    /// Upload the vault as-is, creating the remote copy if needed.
    ///
    /// Used after local edits; nothing is downloaded or merged.
    pub async fn push(&self, vault: &Vault, key: &VaultKey, token: &AccessToken) -> Result<()> {
        let body = self.sealed_body(vault, key)?;

        let handle = match self.locate(&vault.vault_id, token).await? {
            Some(file) => {
                self.bounded(
                    "upload",
                    self.remote.upload_overwrite(&file.handle, &body, token),
                )
                .await?;
                file.handle
            }
            None => {
                let name = remote_file_name(&vault.vault_id);
                self.bounded("upload", self.remote.upload_new(&name, &body, token))
                    .await?
            }
        };
        self.record_handle(&vault.vault_id, &handle).await?;
        debug!(vault_id = %vault.vault_id, version = vault.version, "Vault pushed");
        Ok(())
    }

    /// Remove the remote copy of a vault, if one exists, and forget its handle.
    pub async fn delete_remote(&self, vault_id: &Uuid, token: &AccessToken) -> Result<()> {
        if let Some(file) = self.locate(vault_id, token).await? {
            self.bounded("delete", self.remote.delete(&file.handle, token))
                .await?;
            debug!(%vault_id, "Remote copy deleted");
        }
        self.store.remove(&keys::file_id(vault_id)).await
    }

    /// The remote copy of a vault.
    ///
    /// A recorded handle wins over the name lookup: copies carried over from
    /// the single-vault layout keep their old remote name.
    async fn locate(&self, vault_id: &Uuid, token: &AccessToken) -> Result<Option<RemoteFile>> {
        let recorded = self
            .store
            .get(&keys::file_id(vault_id))
            .await?
            .and_then(|bytes| String::from_utf8(bytes).ok());

        if let Some(handle) = recorded {
            if let Some(file) = self.bounded("stat", self.remote.stat(&handle, token)).await? {
                return Ok(Some(file));
            }
            debug!(%vault_id, "Recorded remote handle is gone, looking up by name");
        }
        self.bounded("find", self.remote.find(&remote_file_name(vault_id), token))
            .await
    }

    fn sealed_body(&self, vault: &Vault, key: &VaultKey) -> Result<Vec<u8>> {
        let encrypted = seal(vault, key)?;
        serde_json::to_vec(&encrypted).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    async fn record_handle(&self, vault_id: &Uuid, handle: &str) -> Result<()> {
        self.store
            .set(&keys::file_id(vault_id), handle.as_bytes())
            .await
    }

    /// Run a remote call under the configured timeout; every failure becomes
    /// a `SyncFailure`.
    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(VaultError::SyncFailure(msg))) => Err(VaultError::SyncFailure(msg)),
            Ok(Err(e)) => Err(VaultError::SyncFailure(format!("{}: {}", op, e))),
            Err(_) => Err(VaultError::SyncFailure(format!(
                "{} timed out after {}s",
                op,
                self.timeout.as_secs_f32()
            ))),
        }
    }
}
