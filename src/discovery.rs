use std::sync::Arc;

use log::{info, warn};

use crate::cache::{FileCache, FileMediaStore, MemoryCache, MemoryMediaStore};
use crate::config::StoreConfig;
use crate::content::http::HttpContentService;
use crate::engine::{Backends, StoreController};
use crate::identity::IdentityHub;
use crate::records::{DocStore, Persistence, RecordClient};
use crate::{MediaStore, Result, SelectionRecords, SnapshotCache};

/// Opens a [`StoreController`] wired to on-disk backends under `config.data_dir`.
///
/// Selection records are chosen the same way the local state is:
///
/// 1. If `record_addr` is set, records go to that record daemon in **Remote
///    Mode**. The connection is made on first use, so an unreachable daemon
///    leaves the store usable with selections offline.
/// 2. Otherwise an embedded [`DocStore`] persisting to `data_dir/records` is
///    used in **Embedded Mode**.
///
/// A local directory that cannot be created or read is logged and replaced by
/// its in-memory counterpart, so the store still opens; only the HTTP client
/// failing to build is an error.
///
/// # Examples
///
/// ```no_run
/// use trunk_store::{config::StoreConfig, discovery};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = discovery::open(&StoreConfig::from_env()).await?;
///     println!("{} items", store.list_catalog().len());
///     store.close().await;
///     Ok(())
/// }
/// ```
pub async fn open(config: &StoreConfig) -> Result<StoreController> {
    let cache: Arc<dyn SnapshotCache> = match FileCache::new(&config.data_dir) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Snapshot cache unavailable at {}: {}; keeping snapshots in memory", config.data_dir.display(), e);
            Arc::new(MemoryCache::new())
        }
    };
    let media: Arc<dyn MediaStore> = match FileMediaStore::new(config.media_dir()) {
        Ok(media) => Arc::new(media),
        Err(e) => {
            warn!("Media store unavailable at {}: {}; keeping media in memory", config.media_dir().display(), e);
            Arc::new(MemoryMediaStore::new())
        }
    };
    let content = Arc::new(HttpContentService::new(config.remote_timeout)?);

    let records: Arc<dyn SelectionRecords> = match &config.record_addr {
        Some(addr) => {
            info!("Selection records: remote daemon at {}", addr);
            Arc::new(RecordClient::lazy(addr))
        }
        None => Arc::new(embedded_records(config)),
    };

    let backends = Backends::new(cache, media).with_records(records).with_content(content);
    Ok(StoreController::open(backends, config.controller_options()).await)
}

fn embedded_records(config: &StoreConfig) -> DocStore {
    let dir = config.records_dir();
    let loaded = Persistence::new(&dir).and_then(|persistence| {
        let initial_data = persistence.load_all()?;
        Ok((persistence, initial_data))
    });
    match loaded {
        Ok((persistence, initial_data)) => {
            info!("Selection records: embedded in {}", dir.display());
            DocStore::new(initial_data, Some(Arc::new(persistence)))
        }
        Err(e) => {
            warn!("Record directory {} unavailable: {}; keeping records in memory", dir.display(), e);
            DocStore::new(Default::default(), None)
        }
    }
}

/// An identity hub whose owner email comes from the configuration when set,
/// else from the store's settings.
pub fn identity_hub(config: &StoreConfig, store: &StoreController) -> IdentityHub {
    let owner_email = config.owner_email.clone().unwrap_or_else(|| store.settings().owner_email);
    IdentityHub::new(owner_email)
}
