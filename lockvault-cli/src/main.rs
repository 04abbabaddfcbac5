//! LockVault CLI
//!
//! Every invocation opens the local store, unlocks, runs one command over the
//! session protocol and locks again.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lockvault_core::session::Command;
use lockvault_core::vault::{Category, EntryDraft};
use lockvault_core::{
    Config, DirectoryRemote, FileStore, MemoryRemote, NoToken, PasswordOptions, RemoteStore,
    Session, StaticToken, TokenProvider,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zeroize::Zeroizing;

/// LockVault - local-first encrypted credential vaults
#[derive(Parser)]
#[command(name = "lockvault", about = "Local-first encrypted credential vaults", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Folder used as the remote drive
    #[arg(long)]
    remote_dir: Option<PathBuf>,

    /// Vault to open instead of the active one
    #[arg(long)]
    vault: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the first vault
    Init,

    /// Show lock and sync state
    Status,

    /// List vault databases
    Vaults,

    /// Create a new vault database and make it active
    Create {
        name: String,
    },

    /// Make another vault database active
    Switch {
        vault_id: Uuid,
    },

    /// Rename a vault database
    Rename {
        vault_id: Uuid,
        name: String,
    },

    /// Delete a vault database and its remote copy
    Delete {
        vault_id: Uuid,
    },

    /// Add or update a credential
    Add {
        #[arg(long)]
        site: String,

        #[arg(long, default_value = "")]
        url: String,

        #[arg(long, default_value = "")]
        username: String,

        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,

        /// Work, Personal, Finance, Social or Other
        #[arg(long, default_value = "Other")]
        category: String,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        favorite: bool,

        /// Existing entry to update
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Remove a credential
    Remove {
        id: Uuid,
    },

    /// List credentials
    List {
        /// Show passwords in plain text
        #[arg(long)]
        show_passwords: bool,
    },

    /// Credentials matching a host name
    Find {
        hostname: String,
    },

    /// Import a CSV export from another password manager
    Import {
        file: PathBuf,
    },

    /// Generate a password
    Generate {
        #[arg(long, default_value_t = 20)]
        length: usize,

        #[arg(long)]
        no_uppercase: bool,

        #[arg(long)]
        no_lowercase: bool,

        #[arg(long)]
        no_numbers: bool,

        #[arg(long)]
        no_symbols: bool,
    },

    /// Reconcile with the remote copy
    Sync,

    /// Print the encrypted backup of the vault
    Export,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.remote_dir {
        config.remote_dir = Some(dir);
    }

    let mut session = open_session(&config).await?;

    match cli.command {
        Commands::Init => {
            let password = prompt_new_password()?;
            run(&mut session, Command::Setup {
                password: password.to_string(),
            })
            .await?;
            info!("Vault initialized");
        }
        Commands::Status => {
            print(&run(&mut session, Command::GetState).await?)?;
        }
        Commands::Vaults => {
            print(&run(&mut session, Command::ListVaults).await?)?;
        }
        Commands::Generate {
            length,
            no_uppercase,
            no_lowercase,
            no_numbers,
            no_symbols,
        } => {
            let options = PasswordOptions::default()
                .length(length)
                .with_uppercase(!no_uppercase)
                .with_lowercase(!no_lowercase)
                .with_numbers(!no_numbers)
                .with_symbols(!no_symbols);
            print(&run(&mut session, Command::GeneratePassword(Some(options))).await?)?;
        }
        Commands::Rename { vault_id, name } => {
            print(&run(&mut session, Command::RenameVaultDb { vault_id, name }).await?)?;
        }
        command => {
            let password = prompt_password()?;
            run(&mut session, Command::Unlock {
                password: password.to_string(),
                vault_id: cli.vault,
            })
            .await?;

            let result = run_unlocked(&mut session, command, &password).await;
            session.lock();
            print(&result?)?;
        }
    }

    Ok(())
}

async fn open_session(config: &Config) -> Result<Session> {
    let store = FileStore::open(&config.data_dir)
        .await
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;

    let remote: Arc<dyn RemoteStore>;
    let tokens: Arc<dyn TokenProvider>;
    match &config.remote_dir {
        Some(dir) => {
            remote = Arc::new(DirectoryRemote::new(dir));
            // A plain folder needs no credentials
            tokens = Arc::new(StaticToken::new("local-folder"));
        }
        None => {
            remote = Arc::new(MemoryRemote::new());
            tokens = Arc::new(NoToken);
        }
    }
    debug!(
        data_dir = %config.data_dir.display(),
        remote = config.remote_dir.is_some(),
        "Opening session"
    );

    Ok(Session::open(Arc::new(store), remote, tokens, config).await?)
}

async fn run_unlocked(session: &mut Session, command: Commands, password: &str) -> Result<Value> {
    let command = match command {
        Commands::Create { name } => Command::CreateVaultDb {
            name,
            password: password.to_string(),
        },
        Commands::Switch { vault_id } => Command::SwitchVault {
            vault_id,
            password: password.to_string(),
        },
        Commands::Delete { vault_id } => Command::DeleteVaultDb {
            vault_id,
            password: Some(password.to_string()),
        },
        Commands::Add {
            site,
            url,
            username,
            password: entry_password,
            category,
            notes,
            favorite,
            id,
        } => {
            let category = Category::parse(&category)
                .with_context(|| format!("unknown category {:?}", category))?;
            let entry_password = match entry_password {
                Some(p) => p,
                None => rpassword::prompt_password("Entry password: ")?,
            };
            Command::SaveEntry(EntryDraft {
                id,
                site_name: site,
                url,
                username,
                password: entry_password,
                category,
                favorite,
                notes,
            })
        }
        Commands::Remove { id } => Command::DeleteEntry { entry_id: id },
        Commands::List { show_passwords } => {
            let mut data = run(session, Command::GetVault).await?;
            let entries = data
                .pointer_mut("/vault/entries")
                .map(Value::take)
                .unwrap_or(Value::Null);
            let entries = if show_passwords {
                entries
            } else {
                mask_passwords(entries)
            };
            return Ok(entries);
        }
        Commands::Find { hostname } => Command::GetEntriesForUrl { hostname },
        Commands::Import { file } => {
            let csv = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            Command::ImportCsv { csv }
        }
        Commands::Sync => Command::SyncVault,
        Commands::Export => Command::ExportVault,
        Commands::Init
        | Commands::Status
        | Commands::Vaults
        | Commands::Rename { .. }
        | Commands::Generate { .. } => bail!("command does not open a vault"),
    };

    run(session, command).await
}

/// Send one command, turning a failed response into an error
async fn run(session: &mut Session, command: Command) -> Result<Value> {
    let response = session.handle(command).await;
    if !response.success {
        bail!(
            "{}: {}",
            response.error.unwrap_or_default(),
            response.message.unwrap_or_default()
        );
    }
    Ok(response.data.unwrap_or(Value::Null))
}

fn mask_passwords(mut entries: Value) -> Value {
    if let Some(list) = entries.as_array_mut() {
        for entry in list.iter_mut().filter_map(Value::as_object_mut) {
            entry.insert("password".to_string(), Value::String("********".to_string()));
        }
    }
    entries
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt_password() -> Result<Zeroizing<String>> {
    Ok(Zeroizing::new(rpassword::prompt_password("Master password: ")?))
}

fn prompt_new_password() -> Result<Zeroizing<String>> {
    let password = Zeroizing::new(rpassword::prompt_password("New master password: ")?);
    let confirm = Zeroizing::new(rpassword::prompt_password("Confirm master password: ")?);
    if *password != *confirm {
        bail!("passwords do not match");
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::parse_from([
            "lockvault",
            "--data-dir",
            "/tmp/lv",
            "list",
            "--show-passwords",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/lv")));
        assert!(matches!(cli.command, Commands::List { show_passwords: true }));
    }

    #[tokio::test]
    async fn test_commands_run_through_session() {
        let config = Config {
            kdf_iterations: 2_000,
            ..Config::default()
        };
        let mut session = Session::new(
            Arc::new(lockvault_core::MemoryStore::new()),
            Arc::new(MemoryRemote::new()),
            Arc::new(NoToken),
            &config,
        );

        run(&mut session, Command::Setup {
            password: "master-pw".to_string(),
        })
        .await
        .unwrap();

        let add = Commands::Add {
            site: "GitHub".to_string(),
            url: "https://github.com".to_string(),
            username: "octo".to_string(),
            password: Some("secret".to_string()),
            category: "Work".to_string(),
            notes: None,
            favorite: false,
            id: None,
        };
        let saved = run_unlocked(&mut session, add, "master-pw").await.unwrap();
        assert_eq!(saved["entry"]["site_name"], "GitHub");

        let list = Commands::List {
            show_passwords: false,
        };
        let listed = run_unlocked(&mut session, list, "master-pw").await.unwrap();
        assert_eq!(listed[0]["username"], "octo");
        assert_eq!(listed[0]["password"], "********");

        let bad_category = Commands::Add {
            site: "x".to_string(),
            url: String::new(),
            username: String::new(),
            password: Some("y".to_string()),
            category: "Nope".to_string(),
            notes: None,
            favorite: false,
            id: None,
        };
        assert!(run_unlocked(&mut session, bad_category, "master-pw").await.is_err());

        session.lock();
        let err = run(&mut session, Command::GetVault).await.unwrap_err();
        assert!(err.to_string().starts_with("VAULT_LOCKED"));
    }

    #[test]
    fn test_mask_passwords() {
        let entries = serde_json::json!([{ "site_name": "x", "password": "secret" }]);
        let masked = mask_passwords(entries);
        assert_eq!(masked[0]["password"], "********");
        assert_eq!(masked[0]["site_name"], "x");
    }
}
