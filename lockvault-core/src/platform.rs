//! Platform-specific directory resolution

use std::path::PathBuf;

const APP_DIR: &str = "LockVault";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "lockvault.toml";

/// Get the platform-specific data directory holding vault records
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\LockVault
/// - macOS: ~/Library/Application Support/LockVault
/// - Linux/Other: ~/.local/share/LockVault
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the default config file path
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE_NAME)
}
