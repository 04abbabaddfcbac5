//! Entry-level mutations and lookups on a [`Vault`].
//!
//! Every mutation returns a new vault with `version` bumped by exactly one;
//! the input is left untouched so a failed persist can simply be discarded.

use crate::crypto::new_id;
use crate::vault::model::{EntryDraft, Vault, VaultEntry};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

fn bump(vault: &mut Vault, now: DateTime<Utc>) {
    vault.version += 1;
    vault.last_updated = vault.last_updated.max(now);
}

/// Insert a new entry or update an existing one.
///
/// A draft without an id, or with an id the vault does not hold, becomes a new
/// entry. Updating keeps `created_at` and never moves `updated_at` backwards.
pub fn save_entry(vault: &Vault, draft: EntryDraft, now: DateTime<Utc>) -> Vault {
    let mut next = vault.clone();

    let existing = draft
        .id
        .and_then(|id| next.entries.iter_mut().find(|e| e.id == id));

    match existing {
        Some(entry) => {
            entry.site_name = draft.site_name;
            entry.url = draft.url;
            entry.username = draft.username;
            entry.password = draft.password;
            entry.category = draft.category;
            entry.favorite = draft.favorite;
            entry.notes = draft.notes;
            entry.updated_at = entry.updated_at.max(now);
        }
        None => next.entries.push(VaultEntry {
            id: draft.id.unwrap_or_else(new_id),
            site_name: draft.site_name,
            url: draft.url,
            username: draft.username,
            password: draft.password,
            category: draft.category,
            favorite: draft.favorite,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        }),
    }

    bump(&mut next, now);
    next
}

/// Remove an entry by id
pub fn delete_entry(vault: &Vault, id: &Uuid, now: DateTime<Utc>) -> Result<Vault> {
    if vault.entry(id).is_none() {
        return Err(VaultError::EntryNotFound(*id));
    }

    let mut next = vault.clone();
    next.entries.retain(|e| &e.id != id);
    bump(&mut next, now);
    Ok(next)
}

/// Append a batch of entries as one mutation.
///
/// Imported entries keep their timestamps; an id that collides with an
/// existing entry (or an earlier one in the batch) is replaced by a fresh one.
pub fn bulk_add(vault: &Vault, entries: Vec<VaultEntry>, now: DateTime<Utc>) -> Vault {
    let mut next = vault.clone();
    let mut seen: HashSet<Uuid> = next.entries.iter().map(|e| e.id).collect();

    for mut entry in entries {
        if !seen.insert(entry.id) {
            entry.id = new_id();
            seen.insert(entry.id);
        }
        next.entries.push(entry);
    }

    bump(&mut next, now);
    next
}

/// Entries whose URL matches `hostname`, for autofill.
///
/// Matches the exact host or a subdomain in either direction. Entries with no
/// parsable host fall back to a substring match on the raw URL.
pub fn entries_for_url<'a>(vault: &'a Vault, hostname: &str) -> Vec<&'a VaultEntry> {
    let hostname = hostname.trim().to_ascii_lowercase();
    if hostname.is_empty() {
        return Vec::new();
    }

    vault
        .entries
        .iter()
        .filter(|entry| match url_host(&entry.url) {
            Some(host) => {
                host == hostname
                    || host.ends_with(&format!(".{}", hostname))
                    || hostname.ends_with(&format!(".{}", host))
            }
            None => entry.url.contains(&hostname),
        })
        .collect()
}

/// Extract the lowercase host from an absolute URL (`scheme://[user@]host[:port]/...`)
pub fn url_host(url: &str) -> Option<String> {
    let (scheme, rest) = url.trim().split_once("://")?;
    let scheme_ok = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c));
    if !scheme_ok {
        return None;
    }

    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = match host_port.strip_prefix('[') {
        Some(v6) => v6.split(']').next()?,
        None => host_port.split(':').next()?,
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::model::Category;
    use chrono::Duration;

    fn draft(site: &str, url: &str) -> EntryDraft {
        EntryDraft {
            site_name: site.to_string(),
            url: url.to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            ..Default::default()
        }
    }

    fn empty_vault() -> Vault {
        Vault::new([0u8; 16], Utc::now())
    }

    #[test]
    fn test_save_new_entry() {
        let vault = empty_vault();
        let now = Utc::now();

        let next = save_entry(&vault, draft("Example", "https://example.com"), now);

        assert_eq!(next.version, vault.version + 1);
        assert_eq!(next.entries.len(), 1);
        let entry = &next.entries[0];
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.updated_at, now);
        assert!(!entry.id.is_nil());
        // Input untouched
        assert!(vault.entries.is_empty());
    }

    #[test]
    fn test_save_existing_entry_preserves_created_at() {
        let t0 = Utc::now();
        let vault = save_entry(&empty_vault(), draft("Example", "https://example.com"), t0);
        let original = vault.entries[0].clone();

        let mut update = EntryDraft::from(original.clone());
        update.password = "new-secret".to_string();
        update.category = Category::Finance;
        let t1 = t0 + Duration::seconds(30);
        let next = save_entry(&vault, update, t1);

        assert_eq!(next.entries.len(), 1);
        let entry = &next.entries[0];
        assert_eq!(entry.id, original.id);
        assert_eq!(entry.created_at, original.created_at);
        assert_eq!(entry.updated_at, t1);
        assert_eq!(entry.password, "new-secret");
        assert_eq!(entry.category, Category::Finance);
        assert_eq!(next.version, vault.version + 1);
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let t0 = Utc::now();
        let vault = save_entry(&empty_vault(), draft("Example", "https://example.com"), t0);
        let update = EntryDraft::from(vault.entries[0].clone());

        let next = save_entry(&vault, update, t0 - Duration::hours(1));

        assert_eq!(next.entries[0].updated_at, t0);
        assert_eq!(next.last_updated, vault.last_updated.max(t0));
    }

    #[test]
    fn test_save_with_unknown_id_adds_entry() {
        let id = new_id();
        let mut d = draft("Example", "https://example.com");
        d.id = Some(id);

        let next = save_entry(&empty_vault(), d, Utc::now());
        assert_eq!(next.entries[0].id, id);
    }

    #[test]
    fn test_delete_entry() {
        let vault = save_entry(&empty_vault(), draft("A", "https://a.com"), Utc::now());
        let id = vault.entries[0].id;

        let next = delete_entry(&vault, &id, Utc::now()).unwrap();
        assert!(next.entries.is_empty());
        assert_eq!(next.version, vault.version + 1);

        assert!(matches!(
            delete_entry(&next, &id, Utc::now()),
            Err(VaultError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_bulk_add_is_one_version_and_reassigns_collisions() {
        let vault = save_entry(&empty_vault(), draft("A", "https://a.com"), Utc::now());
        let mut dup = vault.entries[0].clone();
        dup.site_name = "Imported A".to_string();
        let mut fresh = dup.clone();
        fresh.id = new_id();

        let next = bulk_add(&vault, vec![dup, fresh.clone()], Utc::now());

        assert_eq!(next.version, vault.version + 1);
        assert_eq!(next.entries.len(), 3);
        let ids: HashSet<Uuid> = next.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(next.entry(&fresh.id).is_some());
    }

    #[test]
    fn test_entries_for_url() {
        let now = Utc::now();
        let mut vault = empty_vault();
        for (site, url) in [
            ("Example", "https://www.example.com/login"),
            ("Mail", "https://mail.google.com"),
            ("Bare", "intranet.local"),
            ("Other", "https://other.org"),
        ] {
            vault = save_entry(&vault, draft(site, url), now);
        }

        let hits: Vec<&str> = entries_for_url(&vault, "example.com")
            .iter()
            .map(|e| e.site_name.as_str())
            .collect();
        assert_eq!(hits, vec!["Example"]);

        let hits = entries_for_url(&vault, "accounts.mail.google.com");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].site_name, "Mail");

        let hits = entries_for_url(&vault, "intranet");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].site_name, "Bare");

        assert!(entries_for_url(&vault, "").is_empty());
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://Example.COM:8443/a?b"), Some("example.com".to_string()));
        assert_eq!(url_host("ftp://user:pw@files.net"), Some("files.net".to_string()));
        assert_eq!(url_host("http://[::1]:80/"), Some("::1".to_string()));
        assert_eq!(url_host("example.com"), None);
        assert_eq!(url_host("https:///path"), None);
    }
}
