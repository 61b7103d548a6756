use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::model::SelectionRecord;
use crate::records::{Persistence, USERS};
use crate::{Error, Result, SelectionRecords};

pub type Document = Map<String, Value>;
pub type Collection = HashMap<String, Document>;
pub type Collections = HashMap<String, Collection>;

/// In-memory document store with optional write-behind persistence.
///
/// Documents are flat JSON objects grouped by collection. Writes merge
/// top-level fields, so independent writers can own disjoint fields of the same
/// document.
pub struct DocStore {
    data: Arc<RwLock<Collections>>,
    persistence: Option<Arc<Persistence>>,
    save_lock: Arc<Mutex<()>>,
    pending_tasks: Arc<AtomicUsize>,
}

impl DocStore {
    pub fn new(initial_data: Collections, persistence: Option<Arc<Persistence>>) -> Self {
        Self {
            data: Arc::new(RwLock::new(initial_data)),
            persistence,
            save_lock: Arc::new(Mutex::new(())),
            pending_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits until every scheduled disk write has finished.
    pub async fn wait(&self) {
        while self.pending_tasks.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    fn persist(&self, collection: &str) {
        let Some(p) = &self.persistence else {
            return;
        };
        let p = p.clone();
        let data = self.data.clone();
        let save_lock = self.save_lock.clone();
        let pending = self.pending_tasks.clone();
        let collection = collection.to_string();

        pending.fetch_add(1, Ordering::SeqCst);
        tokio::task::spawn_blocking(move || {
            // The copy is taken under the save lock, so whichever task saves last
            // writes the latest state even if tasks run out of order.
            let _guard = save_lock.lock().unwrap();
            let snapshot = data.read().unwrap().get(&collection).cloned().unwrap_or_default();
            if let Err(e) = p.save_collection(&collection, &snapshot) {
                log::error!("Failed to persist collection {}: {}", collection, e);
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Document> {
        let data = self.data.read().unwrap();
        data.get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or(Error::DocumentNotFound)
    }

    /// Merges `fields` into the document, creating it if needed.
    pub async fn merge_fields(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        {
            let mut data = self.data.write().unwrap();
            let doc = data
                .entry(collection.to_string())
                .or_default()
                .entry(id.to_string())
                .or_default();
            for (k, v) in fields {
                doc.insert(k, v);
            }
        }
        self.persist(collection);
        Ok(())
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let removed = {
            let mut data = self.data.write().unwrap();
            data.get_mut(collection).and_then(|c| c.remove(id)).is_some()
        };
        if removed {
            self.persist(collection);
        }
        Ok(())
    }

    /// Document ids of a collection, sorted.
    pub async fn list(&self, collection: &str) -> Result<Vec<String>> {
        let data = self.data.read().unwrap();
        let mut ids: Vec<String> = data
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SelectionRecords for DocStore {
    async fn fetch(&self, uid: &str) -> Result<Option<SelectionRecord>> {
        match self.get(USERS, uid).await {
            Ok(doc) => Ok(Some(serde_json::from_value(Value::Object(doc))?)),
            Err(Error::DocumentNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn merge(&self, uid: &str, record: &SelectionRecord) -> Result<()> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => self.merge_fields(USERS, uid, fields).await,
            _ => Err(Error::Internal("selection record is not an object".to_string())),
        }
    }

    async fn flush(&self) {
        self.wait().await;
    }
}
