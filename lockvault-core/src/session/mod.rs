//! Session control: lock state, auto-lock and the command protocol.

pub mod autolock;
pub mod commands;
pub mod controller;

pub use autolock::AutoLockManager;
pub use commands::{handle_shared, Command, CommandResponse};
pub use controller::{
    spawn_auto_lock, spawn_background_sync, ImportSummary, Session, SessionStatus, SyncReport,
    VaultListing, SETUP_VAULT_NAME,
};
