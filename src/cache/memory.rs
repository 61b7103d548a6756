use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::{sort_media, MediaAsset};
use crate::{MediaStore, Result, SnapshotCache};

/// A snapshot cache that lives only as long as the process.
#[derive(Default)]
pub struct MemoryCache {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.read().unwrap();
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.write().unwrap();
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().unwrap();
        data.remove(key);
        Ok(())
    }
}

/// In-memory media store, newest first.
#[derive(Default)]
pub struct MemoryMediaStore {
    assets: RwLock<Vec<MediaAsset>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaStore for MemoryMediaStore {
    fn load_all(&self) -> Result<Vec<MediaAsset>> {
        Ok(self.assets.read().unwrap().clone())
    }

    fn put(&self, asset: &MediaAsset) -> Result<()> {
        let mut assets = self.assets.write().unwrap();
        assets.retain(|a| a.id != asset.id);
        assets.push(asset.clone());
        sort_media(&mut assets);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.assets.write().unwrap().retain(|a| a.id != id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.assets.write().unwrap().clear();
        Ok(())
    }
}
