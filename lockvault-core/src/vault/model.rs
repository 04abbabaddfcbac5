//! Vault data model: entries, vaults, their at-rest form and the registry.

use crate::crypto::{new_id, SALT_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of entry categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Work,
    Personal,
    Finance,
    Social,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Work,
        Category::Personal,
        Category::Finance,
        Category::Social,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "Work",
            Self::Personal => "Personal",
            Self::Finance => "Finance",
            Self::Social => "Social",
            Self::Other => "Other",
        }
    }

    /// Parse a category name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// One stored credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: Uuid,
    pub site_name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub category: Category,
    pub favorite: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied entry fields for a save.
///
/// `id` is absent for new entries; timestamps are always assigned by the vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDraft {
    pub id: Option<Uuid>,
    pub site_name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub category: Category,
    pub favorite: bool,
    pub notes: Option<String>,
}

impl From<VaultEntry> for EntryDraft {
    fn from(entry: VaultEntry) -> Self {
        Self {
            id: Some(entry.id),
            site_name: entry.site_name,
            url: entry.url,
            username: entry.username,
            password: entry.password,
            category: entry.category,
            favorite: entry.favorite,
            notes: entry.notes,
        }
    }
}

/// One encryption domain: a versioned, salted collection of entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub vault_id: Uuid,
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(with = "b64::salt")]
    pub salt: [u8; SALT_LEN],
    pub entries: Vec<VaultEntry>,
}

impl Vault {
    /// A new empty vault at version 1
    pub fn new(salt: [u8; SALT_LEN], now: DateTime<Utc>) -> Self {
        Self {
            vault_id: new_id(),
            version: 1,
            last_updated: now,
            salt,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, id: &Uuid) -> Option<&VaultEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }
}

/// At-rest form of a [`Vault`].
///
/// Salt and timestamp stay in cleartext so a remote copy can be compared for
/// staleness, and a key re-derived, without decrypting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVault {
    #[serde(with = "b64::bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64::bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "b64::salt")]
    pub salt: [u8; SALT_LEN],
    pub last_updated: DateTime<Utc>,
}

/// Registry-visible descriptor of a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMeta {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_opened: DateTime<Utc>,
}

impl VaultMeta {
    pub fn new(id: Uuid, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: now,
            last_opened: now,
        }
    }
}

/// Durable index of all vault databases and the active one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRegistry {
    pub active_vault_id: Uuid,
    #[serde(with = "b64::salt")]
    pub salt: [u8; SALT_LEN],
    pub vaults: Vec<VaultMeta>,
}

impl VaultRegistry {
    pub fn find(&self, id: &Uuid) -> Option<&VaultMeta> {
        self.vaults.iter().find(|v| &v.id == id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.find(id).is_some()
    }

    pub fn active_meta(&self) -> Option<&VaultMeta> {
        self.find(&self.active_vault_id)
    }
}

/// Base64 encoding for binary fields inside JSON records
mod b64 {
    pub mod bytes {
        use base64::{engine::general_purpose::STANDARD, Engine};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&STANDARD.encode(bytes))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(d)?;
            STANDARD.decode(&s).map_err(serde::de::Error::custom)
        }
    }

    pub mod salt {
        use crate::crypto::SALT_LEN;
        use base64::{engine::general_purpose::STANDARD, Engine};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(salt: &[u8; SALT_LEN], s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&STANDARD.encode(salt))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; SALT_LEN], D::Error> {
            let s = String::deserialize(d)?;
            let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
            bytes.try_into().map_err(|b: Vec<u8>| {
                serde::de::Error::custom(format!(
                    "salt must be {} bytes, got {}",
                    SALT_LEN,
                    b.len()
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("finance"), Some(Category::Finance));
        assert_eq!(Category::parse(" Work "), Some(Category::Work));
        assert_eq!(Category::parse("misc"), None);
        assert_eq!(Category::default(), Category::Other);
    }

    #[test]
    fn test_new_vault_is_empty_at_version_one() {
        let now = Utc::now();
        let vault = Vault::new([1u8; SALT_LEN], now);
        assert_eq!(vault.version, 1);
        assert_eq!(vault.last_updated, now);
        assert!(vault.entries.is_empty());
    }

    #[test]
    fn test_encrypted_vault_json_shape() {
        let encrypted = EncryptedVault {
            ciphertext: vec![1, 2, 3],
            iv: vec![0u8; 12],
            salt: [9u8; SALT_LEN],
            last_updated: Utc::now(),
        };
        let value = serde_json::to_value(&encrypted).unwrap();
        assert_eq!(value["ciphertext"], "AQID");
        assert!(value["salt"].is_string());
        assert!(value["last_updated"].is_string());

        let back: EncryptedVault = serde_json::from_value(value).unwrap();
        assert_eq!(back, encrypted);
    }

    #[test]
    fn test_short_salt_rejected() {
        let json = r#"{"active_vault_id":"6f1c1f8e-1d1a-4b7e-9a43-0e2c1f3f6a10","salt":"AQID","vaults":[]}"#;
        assert!(serde_json::from_str::<VaultRegistry>(json).is_err());
    }
}
