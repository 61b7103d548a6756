use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::warn;

use crate::model::{sort_media, MediaAsset};
use crate::{Error, MediaStore, Result, SnapshotCache};

/// Writes `bytes` to `path` through a temporary sibling and a rename, so a
/// crash mid-write never leaves a truncated file behind.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp_path = PathBuf::from(temp);

    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Maps an arbitrary id onto a safe file stem. Alphanumerics, `-` and `_` pass
/// through; every other byte becomes `%XX`.
fn file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Snapshot cache backed by one `.json` file per key in a directory.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Opens a cache in `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::Internal("empty cache key".to_string()));
        }
        Ok(self.dir.join(format!("{}.json", file_stem(key))))
    }
}

impl SnapshotCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        write_atomic(&self.path_for(key)?, value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.path_for(key)?)
    }
}

/// Media store keeping each asset in its own file, so one large payload never
/// forces a rewrite of the rest of the library.
pub struct FileMediaStore {
    dir: PathBuf,
}

impl FileMediaStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id)))
    }
}

impl MediaStore for FileMediaStore {
    fn load_all(&self) -> Result<Vec<MediaAsset>> {
        let mut assets = Vec::new();
        if !self.dir.exists() {
            return Ok(assets);
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let content = match fs::read(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Could not read media file {:?}: {}", path, e);
                    continue;
                }
            };

            match serde_json::from_slice::<MediaAsset>(&content) {
                Ok(asset) => assets.push(asset),
                Err(e) => warn!("Could not unmarshal media asset from {:?}: {}", path, e),
            }
        }

        sort_media(&mut assets);
        Ok(assets)
    }

    fn put(&self, asset: &MediaAsset) -> Result<()> {
        let bytes = serde_json::to_vec(asset)?;
        write_atomic(&self.path_for(&asset.id), &bytes)
    }

    fn delete(&self, id: &str) -> Result<()> {
        remove_if_exists(&self.path_for(id))
    }

    fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                remove_if_exists(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn asset(id: &str, secs: i64) -> MediaAsset {
        MediaAsset {
            id: id.to_string(),
            url: "data:image/png;base64,AAAA".to_string(),
            name: format!("{}.png", id),
            kind: MediaKind::Gallery,
            uploaded_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_set_get_remove() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();

        assert_eq!(cache.get("bt_settings_v1").unwrap(), None);
        cache.set("bt_settings_v1", "{\"heroTitle\":\"x\"}").unwrap();
        assert_eq!(cache.get("bt_settings_v1").unwrap().as_deref(), Some("{\"heroTitle\":\"x\"}"));

        cache.remove("bt_settings_v1").unwrap();
        cache.remove("bt_settings_v1").unwrap();
        assert_eq!(cache.get("bt_settings_v1").unwrap(), None);
    }

    #[test]
    fn test_atomic_rename() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        cache.set("bt_hampers_v4", "[]").unwrap();

        assert!(dir.path().join("bt_hampers_v4.json").exists());
        assert!(!dir.path().join("bt_hampers_v4.json.tmp").exists());
    }

    #[test]
    fn test_media_newest_first_and_skips_corrupt() {
        let dir = tempdir().unwrap();
        let store = FileMediaStore::new(dir.path()).unwrap();
        store.put(&asset("old", 1_000)).unwrap();
        store.put(&asset("new/one", 2_000)).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let loaded = store.load_all().unwrap();
        let ids: Vec<_> = loaded.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new/one", "old"]);
        assert!(dir.path().join("new%2Fone.json").exists());

        store.delete("old").unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);

        store.clear().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
