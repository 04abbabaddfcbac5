//! Vaults: the data model, entry operations, the at-rest codec and the
//! registry of vault databases.

pub mod codec;
pub mod model;
pub mod ops;
pub mod registry;

pub use codec::{from_export_text, load_encrypted, open, seal, store_vault, to_export_text};
pub use model::{Category, EncryptedVault, EntryDraft, Vault, VaultEntry, VaultMeta, VaultRegistry};
pub use registry::{
    add_vault, create_registry, delete_vault, load_registry, migrate_legacy, rename_vault,
    save_registry, switch_active,
};
