//! Runtime configuration, read from `lockvault.toml`.

use crate::crypto::kdf::{MIN_ITERATIONS, PBKDF2_ITERATIONS};
use crate::platform::{get_data_dir, get_default_config_path};
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_AUTO_LOCK_MINUTES: u64 = 15;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the registry and vault records
    pub data_dir: PathBuf,
    /// Folder used as the remote drive; sync is disabled when unset
    pub remote_dir: Option<PathBuf>,
    pub auto_lock_minutes: u64,
    pub remote_timeout_secs: u64,
    pub kdf_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            remote_dir: None,
            auto_lock_minutes: DEFAULT_AUTO_LOCK_MINUTES,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            kdf_iterations: PBKDF2_ITERATIONS,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the platform config file, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        let path = get_default_config_path();
        if path.exists() {
            debug!(path = %path.display(), "Loading config");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auto_lock_minutes == 0 {
            return Err(VaultError::Config(
                "auto_lock_minutes must be at least 1".to_string(),
            ));
        }
        if self.remote_timeout_secs == 0 {
            return Err(VaultError::Config(
                "remote_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.kdf_iterations < MIN_ITERATIONS {
            return Err(VaultError::Config(format!(
                "kdf_iterations must be at least {}",
                MIN_ITERATIONS
            )));
        }
        Ok(())
    }

    pub fn auto_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_lock_minutes * 60)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}
