//! Last-Write-Wins merge of two copies of the same vault.

use crate::vault::model::{Vault, VaultEntry};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Which copy of an entry survives a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the remote entry (remote is newer or equal).
    KeepRemote,
    /// Take the local entry (local is strictly newer).
    TakeLocal,
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve a conflict between two copies of one entry.
    ///
    /// Local wins only with a strictly later `updated_at`; ties keep remote.
    pub fn resolve(local: &VaultEntry, remote: &VaultEntry) -> Resolution {
        if local.updated_at > remote.updated_at {
            Resolution::TakeLocal
        } else {
            Resolution::KeepRemote
        }
    }
}

/// Merge a local vault with a newer remote copy.
///
/// Remote entries seed the result in remote order; local-only entries follow in
/// local order. There are no tombstones, so an entry deleted on one side but
/// present on the other survives. Identity (`vault_id`, `salt`) comes from the
/// local copy and the version moves past both inputs.
pub fn merge(local: &Vault, remote: &Vault, now: DateTime<Utc>) -> Vault {
    let local_by_id: HashMap<Uuid, &VaultEntry> =
        local.entries.iter().map(|e| (e.id, e)).collect();

    let mut entries: Vec<VaultEntry> = remote
        .entries
        .iter()
        .map(|remote_entry| match local_by_id.get(&remote_entry.id) {
            Some(local_entry)
                if ConflictResolver::resolve(local_entry, remote_entry)
                    == Resolution::TakeLocal =>
            {
                (*local_entry).clone()
            }
            _ => remote_entry.clone(),
        })
        .collect();

    let remote_ids: HashSet<Uuid> =
        remote.entries.iter().map(|e| e.id).collect();
    entries.extend(
        local
            .entries
            .iter()
            .filter(|e| !remote_ids.contains(&e.id))
            .cloned(),
    );

    Vault {
        vault_id: local.vault_id,
        version: local.version.max(remote.version) + 1,
        last_updated: now,
        salt: local.salt,
        entries,
    }
}
