//! Session controller: owns the unlocked vault and its key.
//!
//! A session is either locked (nothing sensitive in memory) or unlocked with
//! exactly one open vault, the key derived for it and the registry. The key is
//! derived once per unlock or switch and zeroized when the session locks.

use crate::config::Config;
use crate::crypto::{generate_salt, new_id, CryptoError, KdfParams, VaultKey, SALT_LEN};
use crate::import::{import_from_csv, CsvSource};
use crate::remote::{AccessToken, RemoteStore, TokenProvider};
use crate::session::autolock::AutoLockManager;
use crate::storage::{keys, KeyValueStore};
use crate::sync::{SyncAction, SyncEngine, SyncPlan, SyncStatus};
use crate::vault::codec::{load_encrypted, seal, store_vault, to_export_text};
use crate::vault::model::{EntryDraft, Vault, VaultEntry, VaultMeta, VaultRegistry};
use crate::vault::{ops, registry};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Name of the vault created by first-time setup
pub const SETUP_VAULT_NAME: &str = "My Vault";

struct OpenVault {
    key: VaultKey,
    vault: Vault,
    registry: VaultRegistry,
}

enum SessionState {
    Locked,
    Unlocked(Box<OpenVault>),
}

/// Snapshot of what a client needs to render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub is_unlocked: bool,
    pub is_first_time: bool,
    pub sync_status: SyncStatus,
    pub last_synced: Option<DateTime<Utc>>,
    pub active_vault_id: Option<Uuid>,
    pub active_vault_name: Option<String>,
    pub vault_list: Vec<VaultMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultListing {
    pub active_vault_id: Uuid,
    pub vaults: Vec<VaultMeta>,
}

/// A sync of the open vault that plans without holding the session
struct SyncJob {
    engine: SyncEngine,
    token: AccessToken,
    vault: Vault,
    key: VaultKey,
    previous_status: SyncStatus,
}

impl SyncJob {
    /// Remote reads only
    async fn plan(&self) -> Result<SyncPlan> {
        self.engine.plan(&self.vault, &self.key, &self.token).await
    }
}

/// Result of a sync as seen by the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub action: SyncAction,
    pub merged: bool,
    /// False when the result was computed from a superseded vault and dropped
    pub applied: bool,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub source: CsvSource,
    pub imported: usize,
    pub skipped: usize,
}

pub struct Session {
    store: Arc<dyn KeyValueStore>,
    tokens: Arc<dyn TokenProvider>,
    engine: SyncEngine,
    state: SessionState,
    autolock: AutoLockManager,
    kdf_iterations: u32,
    sync_status: SyncStatus,
    last_synced: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        tokens: Arc<dyn TokenProvider>,
        config: &Config,
    ) -> Self {
        let engine = SyncEngine::new(store.clone(), remote).with_timeout(config.remote_timeout());
        Self {
            store,
            tokens,
            engine,
            state: SessionState::Locked,
            autolock: AutoLockManager::new(config.auto_lock_timeout()),
            kdf_iterations: config.kdf_iterations,
            sync_status: SyncStatus::Offline,
            last_synced: None,
        }
    }

    /// Create a session and migrate any single-vault data first
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        tokens: Arc<dyn TokenProvider>,
        config: &Config,
    ) -> Result<Self> {
        let session = Self::new(store, remote, tokens, config);
        session.migrate().await?;
        Ok(session)
    }

    /// Override the inactivity timeout
    pub fn with_auto_lock(mut self, timeout: Duration) -> Self {
        self.autolock = AutoLockManager::new(timeout);
        self
    }

    pub async fn migrate(&self) -> Result<Option<VaultRegistry>> {
        registry::migrate_legacy(self.store.as_ref()).await
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, SessionState::Unlocked(_))
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Lock if the inactivity deadline has passed. Returns true if it locked.
    pub fn check_auto_lock(&mut self) -> bool {
        if self.is_unlocked() && self.autolock.should_lock() {
            warn!("Auto-locking vault due to inactivity");
            self.lock();
            return true;
        }
        false
    }

    /// Create the first vault and its registry, leaving the session unlocked
    pub async fn setup(&mut self, password: &str) -> Result<VaultMeta> {
        if password.is_empty() {
            return Err(VaultError::InvalidInput(
                "Master password cannot be empty".to_string(),
            ));
        }
        let store = self.store.as_ref();
        if registry::load_registry(store).await?.is_some()
            || store.get(keys::LEGACY_VAULT).await?.is_some()
        {
            return Err(VaultError::InvalidInput(
                "A vault has already been set up".to_string(),
            ));
        }

        let now = Utc::now();
        let salt = generate_salt();
        let key = self.derive(password, salt).await?;
        let vault = Vault::new(salt, now);
        let meta = VaultMeta::new(vault.vault_id, SETUP_VAULT_NAME, now);
        let registry = registry::create_registry(meta.clone());

        store_vault(store, &vault, &key).await?;
        registry::save_registry(store, &registry).await?;

        self.state = SessionState::Unlocked(Box::new(OpenVault {
            key,
            vault,
            registry,
        }));
        self.autolock.record_activity();
        info!(vault_id = %meta.id, "Vault created");

        if let Err(e) = self.initial_upload().await {
            warn!(error = %e, "Initial upload skipped");
        }
        Ok(meta)
    }

    async fn initial_upload(&mut self) -> Result<()> {
        let token = self
            .tokens
            .token_silent()
            .await
            .ok_or_else(|| VaultError::SetupOffline("no access token".to_string()))?;
        let SessionState::Unlocked(open) = &self.state else {
            return Err(VaultError::VaultLocked);
        };
        self.engine
            .push(&open.vault, &open.key, &token)
            .await
            .map_err(|e| VaultError::SetupOffline(e.to_string()))?;
        self.sync_status = SyncStatus::Synced;
        self.last_synced = Some(Utc::now());
        Ok(())
    }

    /// Open a vault with the master password.
    ///
    /// Without an explicit id the registry's active vault is opened. Opening
    /// another vault makes it the active one.
    pub async fn unlock(&mut self, password: &str, vault_id: Option<Uuid>) -> Result<VaultMeta> {
        self.state = SessionState::Locked;
        self.autolock.cancel();

        let store = self.store.as_ref();
        let current = registry::load_registry(store)
            .await?
            .ok_or(VaultError::NoVault)?;
        let target = vault_id.unwrap_or(current.active_vault_id);
        let (key, vault) = self.open_vault(&current, &target, password).await?;

        let registry = if target != current.active_vault_id {
            let next = registry::switch_active(&current, &target, Utc::now())?;
            registry::save_registry(store, &next).await?;
            next
        } else {
            current
        };
        let meta = registry
            .find(&target)
            .cloned()
            .ok_or(VaultError::UnknownVault(target))?;

        self.state = SessionState::Unlocked(Box::new(OpenVault {
            key,
            vault,
            registry,
        }));
        self.autolock.record_activity();
        info!(vault_id = %target, "Vault unlocked");
        Ok(meta)
    }

    /// Drop the key and all decrypted data immediately
    pub fn lock(&mut self) {
        if self.is_unlocked() {
            info!("Vault locked");
        }
        self.state = SessionState::Locked;
        self.autolock.cancel();
    }

    pub async fn state(&mut self) -> Result<SessionStatus> {
        self.check_auto_lock();

        match &self.state {
            SessionState::Unlocked(open) => Ok(SessionStatus {
                is_unlocked: true,
                is_first_time: false,
                sync_status: self.sync_status,
                last_synced: self.last_synced,
                active_vault_id: Some(open.vault.vault_id),
                active_vault_name: open.registry.active_meta().map(|m| m.name.clone()),
                vault_list: open.registry.vaults.clone(),
            }),
            SessionState::Locked => {
                let stored = registry::load_registry(self.store.as_ref()).await?;
                Ok(SessionStatus {
                    is_unlocked: false,
                    is_first_time: stored.is_none(),
                    sync_status: self.sync_status,
                    last_synced: self.last_synced,
                    active_vault_id: None,
                    active_vault_name: None,
                    vault_list: stored.map(|r| r.vaults).unwrap_or_default(),
                })
            }
        }
    }

    /// The open vault. Counts as activity.
    pub fn vault(&mut self) -> Result<&Vault> {
        self.touch()?;
        Ok(&self.unlocked()?.vault)
    }

    pub fn registry(&mut self) -> Result<&VaultRegistry> {
        Ok(&self.unlocked()?.registry)
    }

    /// Registered vaults; readable while locked so a client can pick one to unlock
    pub async fn list_vaults(&mut self) -> Result<VaultListing> {
        self.check_auto_lock();
        let registry = match &self.state {
            SessionState::Unlocked(open) => open.registry.clone(),
            SessionState::Locked => registry::load_registry(self.store.as_ref())
                .await?
                .ok_or(VaultError::NoVault)?,
        };
        Ok(VaultListing {
            active_vault_id: registry.active_vault_id,
            vaults: registry.vaults,
        })
    }

    /// Create a new vault keyed with `password` and switch to it
    pub async fn create_vault(&mut self, name: &str, password: &str) -> Result<VaultMeta> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::InvalidInput(
                "Vault name cannot be empty".to_string(),
            ));
        }
        let current = self.unlocked()?.registry.clone();

        let now = Utc::now();
        let salt = generate_salt();
        let key = self.derive(password, salt).await?;
        let vault = Vault::new(salt, now);
        let meta = VaultMeta::new(vault.vault_id, name, now);
        let next = registry::add_vault(&current, meta.clone())?;

        let store = self.store.as_ref();
        store_vault(store, &vault, &key).await?;
        registry::save_registry(store, &next).await?;

        self.state = SessionState::Unlocked(Box::new(OpenVault {
            key,
            vault,
            registry: next,
        }));
        self.autolock.record_activity();
        info!(vault_id = %meta.id, "Vault database created");

        self.push_best_effort().await;
        Ok(meta)
    }

    /// Close the open vault and open another one.
    ///
    /// A wrong password leaves the current vault open.
    pub async fn switch_vault(&mut self, id: Uuid, password: &str) -> Result<VaultMeta> {
        let current = self.unlocked()?.registry.clone();
        let (key, vault) = self.open_vault(&current, &id, password).await?;

        let next = registry::switch_active(&current, &id, Utc::now())?;
        registry::save_registry(self.store.as_ref(), &next).await?;
        let meta = next.find(&id).cloned().ok_or(VaultError::UnknownVault(id))?;

        self.state = SessionState::Unlocked(Box::new(OpenVault {
            key,
            vault,
            registry: next,
        }));
        self.autolock.record_activity();
        info!(vault_id = %id, "Switched vault");
        Ok(meta)
    }

    /// Rename a vault. Works on the stored registry while locked.
    pub async fn rename_vault(&mut self, id: Uuid, name: &str) -> Result<VaultMeta> {
        self.check_auto_lock();
        let current = match &self.state {
            SessionState::Unlocked(open) => open.registry.clone(),
            SessionState::Locked => registry::load_registry(self.store.as_ref())
                .await?
                .ok_or(VaultError::NoVault)?,
        };

        let next = registry::rename_vault(&current, &id, name)?;
        registry::save_registry(self.store.as_ref(), &next).await?;
        let meta = next.find(&id).cloned().ok_or(VaultError::UnknownVault(id))?;

        if let SessionState::Unlocked(open) = &mut self.state {
            open.registry = next;
            self.autolock.record_activity();
        }
        Ok(meta)
    }

    /// Delete a vault with its local record, remote handle and remote copy.
    ///
    /// Deleting the open vault opens the next active one when `password` is
    /// given and locks the session otherwise.
    pub async fn delete_vault(&mut self, id: Uuid, password: Option<&str>) -> Result<()> {
        let open = self.unlocked()?;
        let next = registry::delete_vault(&open.registry, &id)?;
        let deleting_open = open.vault.vault_id == id;

        // Open the successor before anything is removed
        let successor = match (deleting_open, password) {
            (true, Some(password)) => {
                let (key, vault) = self
                    .open_vault(&next, &next.active_vault_id, password)
                    .await?;
                Some((key, vault))
            }
            _ => None,
        };

        let store = self.store.as_ref();
        registry::save_registry(store, &next).await?;
        store.remove(&keys::vault(&id)).await?;
        self.delete_remote_best_effort(&id).await;
        store.remove(&keys::file_id(&id)).await?;
        info!(vault_id = %id, "Vault database deleted");

        match successor {
            Some((key, vault)) => {
                let next = registry::switch_active(&next, &vault.vault_id, Utc::now())?;
                registry::save_registry(store, &next).await?;
                self.state = SessionState::Unlocked(Box::new(OpenVault {
                    key,
                    vault,
                    registry: next,
                }));
                self.autolock.record_activity();
            }
            None if deleting_open => self.lock(),
            None => {
                if let SessionState::Unlocked(open) = &mut self.state {
                    open.registry = next;
                }
                self.autolock.record_activity();
            }
        }
        Ok(())
    }

    /// Add or update an entry, returning it as stored
    pub async fn save_entry(&mut self, mut draft: EntryDraft) -> Result<VaultEntry> {
        let id = *draft.id.get_or_insert_with(new_id);
        let next = ops::save_entry(&self.unlocked()?.vault, draft, Utc::now());
        let saved = next.entry(&id).cloned().ok_or(VaultError::EntryNotFound(id))?;

        self.commit_vault(next).await?;
        Ok(saved)
    }

    pub async fn delete_entry(&mut self, id: Uuid) -> Result<()> {
        let next = ops::delete_entry(&self.unlocked()?.vault, &id, Utc::now())?;
        self.commit_vault(next).await
    }

    /// Append entries in one mutation, returning how many were added
    pub async fn bulk_import(&mut self, entries: Vec<VaultEntry>) -> Result<usize> {
        let count = entries.len();
        let next = ops::bulk_add(&self.unlocked()?.vault, entries, Utc::now());
        self.commit_vault(next).await?;
        Ok(count)
    }

    /// Parse an export from another password manager and import its entries
    pub async fn import_csv(&mut self, csv: &str) -> Result<ImportSummary> {
        self.unlocked()?;
        let parsed = import_from_csv(csv, Utc::now());
        let summary = ImportSummary {
            source: parsed.source,
            imported: parsed.entries.len(),
            skipped: parsed.skipped,
        };

        if !parsed.entries.is_empty() {
            self.bulk_import(parsed.entries).await?;
        }
        info!(
            source = summary.source.as_str(),
            imported = summary.imported,
            skipped = summary.skipped,
            "CSV import finished"
        );
        Ok(summary)
    }

    /// Entries matching a page's host name, for autofill
    pub fn entries_for_url(&mut self, hostname: &str) -> Result<Vec<VaultEntry>> {
        self.touch()?;
        let open = self.unlocked()?;
        Ok(ops::entries_for_url(&open.vault, hostname)
            .into_iter()
            .cloned()
            .collect())
    }

    /// The open vault in the encrypted backup format
    pub fn export(&mut self) -> Result<String> {
        let open = self.unlocked()?;
        to_export_text(&seal(&open.vault, &open.key)?)
    }

    /// User-initiated sync; may prompt for remote access
    pub async fn sync(&mut self) -> Result<SyncReport> {
        self.unlocked()?;
        let token = self.tokens.token_interactive().await.map_err(|e| match e {
            VaultError::SyncFailure(_) => e,
            other => VaultError::SyncFailure(other.to_string()),
        })?;
        self.autolock.record_activity();

        let job = self.begin_sync(token)?;
        let plan = job.plan().await;
        self.finish_sync(job, plan).await
    }

    /// Snapshot the open vault for a silent sync; `None` when locked or
    /// without a silent token
    async fn begin_background_sync(&mut self) -> Option<SyncJob> {
        if !self.is_unlocked() {
            return None;
        }
        let Some(token) = self.tokens.token_silent().await else {
            debug!("No silent token, skipping background sync");
            self.sync_status = SyncStatus::Offline;
            return None;
        };
        self.begin_sync(token).ok()
    }

    fn begin_sync(&mut self, token: AccessToken) -> Result<SyncJob> {
        let SessionState::Unlocked(open) = &self.state else {
            return Err(VaultError::VaultLocked);
        };
        let job = SyncJob {
            engine: self.engine.clone(),
            token,
            vault: open.vault.clone(),
            key: open.key.clone(),
            previous_status: self.sync_status,
        };
        self.sync_status = SyncStatus::Syncing;
        Ok(job)
    }

    /// Apply a planned sync if the vault it was planned from is still current.
    ///
    /// A plan made from a superseded snapshot is dropped before anything is
    /// written; the next sync starts over from the newer vault.
    async fn finish_sync(&mut self, job: SyncJob, plan: Result<SyncPlan>) -> Result<SyncReport> {
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                self.sync_status = SyncStatus::Error;
                return Err(e);
            }
        };

        let SessionState::Unlocked(open) = &mut self.state else {
            self.sync_status = job.previous_status;
            return Err(VaultError::VaultLocked);
        };
        if open.vault.vault_id != job.vault.vault_id {
            debug!(vault_id = %job.vault.vault_id, "Vault closed while syncing");
            self.sync_status = job.previous_status;
            return Ok(SyncReport {
                action: plan.action(),
                merged: false,
                applied: false,
                version: job.vault.version,
            });
        }
        if open.vault.version != job.vault.version {
            debug!(
                snapshot = job.vault.version,
                current = open.vault.version,
                "Discarding sync plan for superseded vault"
            );
            self.sync_status = SyncStatus::Conflict;
            return Ok(SyncReport {
                action: plan.action(),
                merged: false,
                applied: false,
                version: open.vault.version,
            });
        }

        let applied = self
            .engine
            .apply(plan, &open.vault, &open.key, &job.token, Utc::now())
            .await;
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                self.sync_status = SyncStatus::Error;
                return Err(e);
            }
        };

        let report = SyncReport {
            action: outcome.action,
            merged: outcome.merged,
            applied: true,
            version: outcome.vault.version,
        };
        open.vault = outcome.vault;
        self.sync_status = SyncStatus::Synced;
        self.last_synced = Some(Utc::now());
        Ok(report)
    }

    /// Persist a mutated vault, then make it current
    async fn commit_vault(&mut self, next: Vault) -> Result<()> {
        let SessionState::Unlocked(open) = &mut self.state else {
            return Err(VaultError::VaultLocked);
        };
        store_vault(self.store.as_ref(), &next, &open.key).await?;
        open.vault = next;
        self.autolock.record_activity();

        self.push_best_effort().await;
        Ok(())
    }

    async fn push_best_effort(&mut self) {
        let Some(token) = self.tokens.token_silent().await else {
            return;
        };
        let SessionState::Unlocked(open) = &self.state else {
            return;
        };
        match self.engine.push(&open.vault, &open.key, &token).await {
            Ok(()) => {
                self.sync_status = SyncStatus::Synced;
                self.last_synced = Some(Utc::now());
            }
            Err(e) => {
                warn!(error = %e, "Remote push failed");
                self.sync_status = SyncStatus::Error;
            }
        }
    }

    async fn delete_remote_best_effort(&self, id: &Uuid) {
        let Some(token) = self.tokens.token_silent().await else {
            return;
        };
        if let Err(e) = self.engine.delete_remote(id, &token).await {
            warn!(vault_id = %id, error = %e, "Remote copy not deleted");
        }
    }

    /// Load, derive and open one registered vault
    async fn open_vault(
        &self,
        registry: &VaultRegistry,
        id: &Uuid,
        password: &str,
    ) -> Result<(VaultKey, Vault)> {
        if !registry.contains(id) {
            return Err(VaultError::UnknownVault(*id));
        }
        let store = self.store.as_ref();
        let encrypted = load_encrypted(store, id)
            .await
            .map_err(as_credentials)?
            .ok_or(VaultError::NoVault)?;

        let key = self.derive(password, encrypted.salt).await?;
        let mut vault = crate::vault::codec::open(&encrypted, &key).map_err(as_credentials)?;

        // Vaults migrated from the single-vault layout carry their old id
        if vault.vault_id != *id {
            debug!(vault_id = %id, "Adopting registry id for vault");
            vault.vault_id = *id;
            store_vault(store, &vault, &key).await?;
        }
        Ok((key, vault))
    }

    /// PBKDF2 off the async executor
    async fn derive(&self, password: &str, salt: [u8; SALT_LEN]) -> Result<VaultKey> {
        let params = KdfParams::new(salt).with_iterations(self.kdf_iterations);
        let password = Zeroizing::new(password.as_bytes().to_vec());

        let key = tokio::task::spawn_blocking(move || params.derive(&password))
            .await
            .map_err(|e| CryptoError::KdfFailed(e.to_string()))??;
        Ok(key)
    }

    fn unlocked(&mut self) -> Result<&OpenVault> {
        self.check_auto_lock();
        match &self.state {
            SessionState::Unlocked(open) => Ok(open),
            SessionState::Locked => Err(VaultError::VaultLocked),
        }
    }

    /// Push the inactivity deadline back
    fn touch(&mut self) -> Result<()> {
        self.unlocked()?;
        self.autolock.record_activity();
        Ok(())
    }
}

/// Wrong password and corruption are indistinguishable to the caller
fn as_credentials(e: VaultError) -> VaultError {
    match e {
        VaultError::Crypto(CryptoError::DecryptionFailure) | VaultError::MalformedVault(_) => {
            VaultError::InvalidCredentials
        }
        other => other,
    }
}

/// Sync the open vault from a background task.
///
/// The session is held only to take the snapshot and to commit the result, so
/// commands keep running while the remote is read. Resolves to `None` when
/// there was nothing to sync or the sync failed.
pub fn spawn_background_sync(session: &Arc<Mutex<Session>>) -> JoinHandle<Option<SyncReport>> {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        let Some(job) = session.lock().await.begin_background_sync().await else {
            return None;
        };
        let plan = job.plan().await;

        let result = session.lock().await.finish_sync(job, plan).await;
        match result {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Background sync failed");
                None
            }
        }
    })
}

/// Lock `session` from a background task once its inactivity deadline passes.
///
/// The task ends when the session is dropped.
pub fn spawn_auto_lock(session: &Arc<Mutex<Session>>, poll: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(session);
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(poll);
        timer.tick().await; // Skip first tick

        loop {
            timer.tick().await;
            let Some(session) = weak.upgrade() else {
                break;
            };
            session.lock().await.check_auto_lock();
        }
    })
}
