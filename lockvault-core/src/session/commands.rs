//! Command protocol spoken by clients of a [`Session`].
//!
//! Requests are tagged JSON objects (`{"type": "SAVE_ENTRY", "payload": {...}}`)
//! and every reply is a [`CommandResponse`].

use crate::crypto::{calculate_entropy, generate_password, strength_label, PasswordOptions};
use crate::session::controller::{spawn_background_sync, Session};
use crate::vault::model::{EntryDraft, VaultEntry};
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Setup {
        password: String,
    },
    Unlock {
        password: String,
        #[serde(default)]
        vault_id: Option<Uuid>,
    },
    Lock,
    GetState,
    GetVault,
    ListVaults,
    CreateVaultDb {
        name: String,
        password: String,
    },
    SwitchVault {
        vault_id: Uuid,
        password: String,
    },
    RenameVaultDb {
        vault_id: Uuid,
        name: String,
    },
    DeleteVaultDb {
        vault_id: Uuid,
        #[serde(default)]
        password: Option<String>,
    },
    SaveEntry(EntryDraft),
    DeleteEntry {
        entry_id: Uuid,
    },
    BulkImport(Vec<VaultEntry>),
    ImportCsv {
        csv: String,
    },
    GeneratePassword(Option<PasswordOptions>),
    GetEntriesForUrl {
        hostname: String,
    },
    SyncVault,
    ExportVault,
}

impl Command {
    /// Wire name of the command
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "SETUP",
            Self::Unlock { .. } => "UNLOCK",
            Self::Lock => "LOCK",
            Self::GetState => "GET_STATE",
            Self::GetVault => "GET_VAULT",
            Self::ListVaults => "LIST_VAULTS",
            Self::CreateVaultDb { .. } => "CREATE_VAULT_DB",
            Self::SwitchVault { .. } => "SWITCH_VAULT",
            Self::RenameVaultDb { .. } => "RENAME_VAULT_DB",
            Self::DeleteVaultDb { .. } => "DELETE_VAULT_DB",
            Self::SaveEntry(_) => "SAVE_ENTRY",
            Self::DeleteEntry { .. } => "DELETE_ENTRY",
            Self::BulkImport(_) => "BULK_IMPORT",
            Self::ImportCsv { .. } => "IMPORT_CSV",
            Self::GeneratePassword(_) => "GENERATE_PASSWORD",
            Self::GetEntriesForUrl { .. } => "GET_ENTRIES_FOR_URL",
            Self::SyncVault => "SYNC_VAULT",
            Self::ExportVault => "EXPORT_VAULT",
        }
    }
}

// Payloads carry passwords
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command({})", self.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Stable error kind, see [`VaultError::kind`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            message: None,
        }
    }

    pub fn err(error: &VaultError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.kind().to_string()),
            message: Some(error.to_string()),
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| VaultError::Serialization(e.to_string()))
}

/// Run one command against a session shared with background tasks.
///
/// A successful UNLOCK is answered before the remote is contacted; the sync
/// that follows it runs in the background.
pub async fn handle_shared(session: &Arc<Mutex<Session>>, command: Command) -> CommandResponse {
    let unlocking = matches!(command, Command::Unlock { .. });
    let response = session.lock().await.handle(command).await;
    if unlocking && response.success {
        spawn_background_sync(session);
    }
    response
}

impl Session {
    /// Run one command. Errors never escape; they become a failed response.
    pub async fn handle(&mut self, command: Command) -> CommandResponse {
        let kind = command.kind();
        match self.dispatch(command).await {
            Ok(data) => CommandResponse::ok(data),
            Err(e) => {
                debug!(command = kind, error = e.kind(), "Command failed");
                CommandResponse::err(&e)
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Option<Value>> {
        let data = match command {
            Command::Setup { password } => {
                self.setup(&password).await?;
                self.vault_and_registry()?
            }
            Command::Unlock { password, vault_id } => {
                self.unlock(&password, vault_id).await?;
                self.vault_and_registry()?
            }
            Command::Lock => {
                self.lock();
                return Ok(None);
            }
            Command::GetState => to_data(&self.state().await?)?,
            Command::GetVault => self.vault_and_registry()?,
            Command::ListVaults => to_data(&self.list_vaults().await?)?,
            Command::CreateVaultDb { name, password } => {
                self.create_vault(&name, &password).await?;
                self.vault_and_registry()?
            }
            Command::SwitchVault { vault_id, password } => {
                self.switch_vault(vault_id, &password).await?;
                self.vault_and_registry()?
            }
            Command::RenameVaultDb { vault_id, name } => {
                let meta = self.rename_vault(vault_id, &name).await?;
                json!({ "vault": to_data(&meta)? })
            }
            Command::DeleteVaultDb { vault_id, password } => {
                self.delete_vault(vault_id, password.as_deref()).await?;
                if self.is_unlocked() {
                    self.vault_and_registry()?
                } else {
                    json!({ "locked": true })
                }
            }
            Command::SaveEntry(draft) => {
                let entry = self.save_entry(draft).await?;
                json!({ "entry": to_data(&entry)?, "vault": to_data(self.vault()?)? })
            }
            Command::DeleteEntry { entry_id } => {
                self.delete_entry(entry_id).await?;
                json!({ "vault": to_data(self.vault()?)? })
            }
            Command::BulkImport(entries) => {
                let imported = self.bulk_import(entries).await?;
                json!({ "imported": imported, "vault": to_data(self.vault()?)? })
            }
            Command::ImportCsv { csv } => to_data(&self.import_csv(&csv).await?)?,
            Command::GeneratePassword(options) => {
                let options = options.unwrap_or_default();
                let password = generate_password(&options)?;
                let entropy = calculate_entropy(&options);
                json!({
                    "password": password,
                    "entropy": entropy,
                    "strength": strength_label(entropy),
                })
            }
            Command::GetEntriesForUrl { hostname } => {
                json!({ "entries": to_data(&self.entries_for_url(&hostname)?)? })
            }
            Command::SyncVault => {
                let report = self.sync().await?;
                json!({ "report": to_data(&report)?, "vault": to_data(self.vault()?)? })
            }
            Command::ExportVault => json!({ "exported": self.export()? }),
        };
        Ok(Some(data))
    }

    fn vault_and_registry(&mut self) -> Result<Value> {
        let vault = to_data(self.vault()?)?;
        let registry = to_data(self.registry()?)?;
        Ok(json!({ "vault": vault, "registry": registry }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::remote::{remote_file_name, MemoryRemote, NoToken, StaticToken};
    use crate::storage::MemoryStore;
    use crate::sync::SyncStatus;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::{Duration, Instant};

    fn config() -> Config {
        Config {
            kdf_iterations: 2_000,
            ..Config::default()
        }
    }

    fn session() -> Session {
        Session::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRemote::new()),
            Arc::new(NoToken),
            &config(),
        )
    }

    fn connected_session(remote: &Arc<MemoryRemote>) -> Session {
        Session::new(
            Arc::new(MemoryStore::new()),
            remote.clone(),
            Arc::new(StaticToken::new("t")),
            &config(),
        )
    }

    fn command(json: &str) -> Command {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_command_wire_format() {
        let cmd = command(
            r#"{"type":"DELETE_ENTRY","payload":{"entry_id":"6f1c1f8e-1d1a-4b7e-9a43-0e2c1f3f6a10"}}"#,
        );
        assert_eq!(cmd.kind(), "DELETE_ENTRY");

        assert_eq!(command(r#"{"type":"LOCK"}"#).kind(), "LOCK");
        assert_eq!(
            command(r#"{"type":"UNLOCK","payload":{"password":"pw"}}"#).kind(),
            "UNLOCK"
        );

        let value = serde_json::to_value(Command::SyncVault).unwrap();
        assert_eq!(value["type"], "SYNC_VAULT");
    }

    #[test]
    fn test_debug_hides_payload() {
        let cmd = Command::Setup {
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", cmd).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_locked_commands_report_vault_locked() {
        let mut session = session();
        for json in [
            r#"{"type":"GET_VAULT"}"#,
            r#"{"type":"EXPORT_VAULT"}"#,
            r#"{"type":"SYNC_VAULT"}"#,
            r#"{"type":"GET_ENTRIES_FOR_URL","payload":{"hostname":"github.com"}}"#,
            r#"{"type":"SAVE_ENTRY","payload":{"site_name":"x","password":"y"}}"#,
        ] {
            let response = session.handle(command(json)).await;
            assert!(!response.success);
            assert_eq!(response.error.as_deref(), Some("VAULT_LOCKED"));
        }
    }

    #[tokio::test]
    async fn test_first_run_flow() {
        let mut session = session();

        let state = session.handle(Command::GetState).await;
        assert!(state.success);
        assert_eq!(state.data.unwrap()["is_first_time"], true);

        let setup = session
            .handle(command(r#"{"type":"SETUP","payload":{"password":"master-pw"}}"#))
            .await;
        assert!(setup.success, "{:?}", setup);

        let saved = session
            .handle(command(
                r#"{"type":"SAVE_ENTRY","payload":{"site_name":"GitHub","url":"https://github.com","username":"octo","password":"pw","category":"Work"}}"#,
            ))
            .await;
        assert!(saved.success);
        assert_eq!(saved.data.unwrap()["entry"]["category"], "Work");

        session.handle(Command::Lock).await;
        let bad = session
            .handle(command(r#"{"type":"UNLOCK","payload":{"password":"wrong"}}"#))
            .await;
        assert_eq!(bad.error.as_deref(), Some("INVALID_CREDENTIALS"));

        let good = session
            .handle(command(r#"{"type":"UNLOCK","payload":{"password":"master-pw"}}"#))
            .await;
        assert!(good.success);
        let data = good.data.unwrap();
        assert_eq!(data["vault"]["entries"].as_array().unwrap().len(), 1);

        let found = session
            .handle(command(
                r#"{"type":"GET_ENTRIES_FOR_URL","payload":{"hostname":"github.com"}}"#,
            ))
            .await;
        assert_eq!(found.data.unwrap()["entries"][0]["username"], "octo");
    }

    #[tokio::test]
    async fn test_generate_password_command() {
        let mut session = session();

        let response = session
            .handle(command(
                r#"{"type":"GENERATE_PASSWORD","payload":{"length":32,"symbols":false}}"#,
            ))
            .await;
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["password"].as_str().unwrap().len(), 32);
        assert_eq!(data["strength"], "Very Strong");

        let invalid = session
            .handle(Command::GeneratePassword(Some(PasswordOptions::default().length(2))))
            .await;
        assert_eq!(invalid.error.as_deref(), Some("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn test_delete_last_vault_command() {
        let mut session = session();
        session.setup("master-pw").await.unwrap();
        let id = session.vault().unwrap().vault_id;

        let response = session
            .handle(Command::DeleteVaultDb {
                vault_id: id,
                password: None,
            })
            .await;
        assert_eq!(response.error.as_deref(), Some("CANNOT_DELETE_LAST_VAULT"));
    }

    #[tokio::test]
    async fn test_shared_unlock_replies_before_sync() {
        let remote = Arc::new(MemoryRemote::new());
        let mut session = connected_session(&remote);
        session.setup("master-pw").await.unwrap();
        session.lock();
        let synced_before = session.state().await.unwrap().last_synced;

        remote.set_latency(Some(Duration::from_millis(300))).await;
        let shared = Arc::new(Mutex::new(session));

        let started = Instant::now();
        let response = handle_shared(
            &shared,
            command(r#"{"type":"UNLOCK","payload":{"password":"master-pw"}}"#),
        )
        .await;
        assert!(response.success, "{:?}", response);
        assert!(started.elapsed() < Duration::from_millis(300));

        // The sync completes on its own afterwards
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = shared.lock().await.state().await.unwrap();
                if state.last_synced > synced_before && state.sync_status == SyncStatus::Synced {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_remote_copy_reports_sync_failure() {
        let remote = Arc::new(MemoryRemote::new());
        remote.set_offline(true);
        let mut session = connected_session(&remote);
        session.setup("master-pw").await.unwrap();
        remote.set_offline(false);

        let id = session.vault().unwrap().vault_id;
        remote
            .put(
                &remote_file_name(&id),
                b"{garbage".to_vec(),
                Utc::now() + ChronoDuration::hours(1),
            )
            .await;

        let response = session.handle(Command::SyncVault).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("SYNC_FAILURE"));
        assert_eq!(session.sync_status(), SyncStatus::Error);
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let text = serde_json::to_string(&CommandResponse::ok(None)).unwrap();
        assert_eq!(text, r#"{"success":true}"#);

        let failed = CommandResponse::err(&VaultError::VaultLocked);
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["error"], "VAULT_LOCKED");
        assert_eq!(value["success"], false);
    }
}
