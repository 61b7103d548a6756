//! Local persistence: the snapshot codec and the local backends.
//!
//! Snapshots are stored as JSON text under fixed, versioned keys. Bumping a key's
//! version abandons whatever the previous version stored; the old key is purged
//! at startup and the snapshot starts over from the built-in default.
pub mod file;
pub mod memory;

pub use file::{FileCache, FileMediaStore};
pub use memory::{MemoryCache, MemoryMediaStore};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Result, SnapshotCache};

/// The global snapshots kept in the [`SnapshotCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    Catalog,
    Occasions,
    Settings,
}

impl SnapshotKey {
    pub const ALL: [SnapshotKey; 3] = [SnapshotKey::Catalog, SnapshotKey::Occasions, SnapshotKey::Settings];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKey::Catalog => "bt_hampers_v4",
            SnapshotKey::Occasions => "bt_occasions_v2",
            SnapshotKey::Settings => "bt_settings_v1",
        }
    }
}

/// Keys written by earlier deployments.
pub const LEGACY_KEYS: &[&str] = &[
    "bt_hampers",
    "bt_hampers_v1",
    "bt_hampers_v2",
    "bt_hampers_v3",
    "bt_occasions",
    "bt_occasions_v1",
    "bt_settings",
];

/// Serializes a snapshot for the cache.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Reads one snapshot, falling back to `default` when the key is missing, the
/// cache cannot be read, or the stored text does not parse.
pub fn load_or_default<T, F>(cache: &dyn SnapshotCache, key: SnapshotKey, default: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    let text = match cache.get(key.as_str()) {
        Ok(Some(text)) => text,
        Ok(None) => {
            debug!("No cached snapshot for {}, using defaults", key.as_str());
            return default();
        }
        Err(e) => {
            warn!("Could not read snapshot {}: {}", key.as_str(), e);
            return default();
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not unmarshal snapshot {}: {}", key.as_str(), e);
            default()
        }
    }
}

/// Removes every legacy key. Failures are logged and skipped.
pub fn purge_legacy(cache: &dyn SnapshotCache) {
    for key in LEGACY_KEYS {
        if let Err(e) = cache.remove(key) {
            warn!("Could not remove legacy snapshot {}: {}", key, e);
        }
    }
}
