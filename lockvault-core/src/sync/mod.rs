//! Cloud sync: last-writer-wins reconciliation of a vault with its remote copy.

pub mod conflict;
pub mod engine;

pub use conflict::{merge, ConflictResolver, Resolution};
pub use engine::{
    SyncAction, SyncEngine, SyncOutcome, SyncPlan, SyncStatus, DEFAULT_REMOTE_TIMEOUT,
};
