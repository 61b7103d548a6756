use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::cache::{self, MemoryCache, MemoryMediaStore, SnapshotKey};
use crate::content::{MediaEvent, MediaUpload, PushAck, RemoteSnapshot, SnapshotData, SyncEnvelope};
use crate::engine::queue::JobQueue;
use crate::engine::session::{Adoption, Followup, LoadTicket, SelectionKind, Session, SessionPhase};
use crate::identity::Identity;
use crate::migrate::{self, Migration, MigrationTarget};
use crate::model::{sort_media, CatalogItem, ContentCategory, MediaAsset, SelectionRecord, Selections, SiteContent};
use crate::{defaults, ContentService, Error, MediaStore, Result, SelectionRecords, SnapshotCache};

/// The storage strategies a controller persists through.
///
/// Only the two local backends are mandatory. Without `records` the cart and
/// wishlist live in memory only; without `content` publish/fetch report
/// [`Error::ServiceUnavailable`].
#[derive(Clone)]
pub struct Backends {
    pub cache: Arc<dyn SnapshotCache>,
    pub media: Arc<dyn MediaStore>,
    pub records: Option<Arc<dyn SelectionRecords>>,
    pub content: Option<Arc<dyn ContentService>>,
}

impl Backends {
    pub fn new(cache: Arc<dyn SnapshotCache>, media: Arc<dyn MediaStore>) -> Self {
        Self { cache, media, records: None, content: None }
    }

    /// Purely in-memory local backends and no remote ones.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()), Arc::new(MemoryMediaStore::new()))
    }

    pub fn with_records(mut self, records: Arc<dyn SelectionRecords>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_content(mut self, content: Arc<dyn ContentService>) -> Self {
        self.content = Some(content);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Bound on every remote call: record fetch/merge and bulk publish/fetch.
    pub remote_timeout: Duration,
    /// Forward media uploads to the bulk content service.
    pub forward_media: bool,
    /// Bulk endpoint used instead of the one stored in settings.
    pub endpoint_override: Option<String>,
    pub migrations: Vec<Migration>,
    /// Record reads tried per reconcile of offline toggles.
    pub reconcile_attempts: u32,
    /// Pause before the second read; doubles after each failure.
    pub reconcile_backoff: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(30),
            forward_media: false,
            endpoint_override: None,
            migrations: migrate::registered(),
            reconcile_attempts: 5,
            reconcile_backoff: Duration::from_millis(500),
        }
    }
}

/// Result of [`StoreController::publish_to_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The service acknowledged the snapshot.
    Confirmed,
    /// The request went out without a transport error but the answer could
    /// not be read. Probably applied, not confirmed.
    Dispatched,
    /// No answer within the timeout. The snapshot may or may not have arrived.
    TimedOut,
    Failed(String),
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Confirmed | PublishOutcome::Dispatched)
    }
}

/// Which collections a fetch replaced, with their new sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub catalog: Option<usize>,
    pub occasions: Option<usize>,
    pub settings: bool,
    pub media: Option<usize>,
}

struct Content {
    catalog: Vec<CatalogItem>,
    occasions: Vec<ContentCategory>,
    settings: SiteContent,
    media: Vec<MediaAsset>,
}

enum LocalJob {
    Snapshot { key: SnapshotKey, body: String },
    PutMedia(MediaAsset),
    DeleteMedia(String),
    ReplaceMedia(Vec<MediaAsset>),
}

impl LocalJob {
    fn describe(&self) -> String {
        match self {
            LocalJob::Snapshot { key, .. } => format!("snapshot {}", key.as_str()),
            LocalJob::PutMedia(a) => format!("media {}", a.id),
            LocalJob::DeleteMedia(id) => format!("media delete {}", id),
            LocalJob::ReplaceMedia(list) => format!("media library ({} assets)", list.len()),
        }
    }

    fn apply(self, cache: &dyn SnapshotCache, media: &dyn MediaStore) -> Result<()> {
        match self {
            LocalJob::Snapshot { key, body } => cache.set(key.as_str(), &body),
            LocalJob::PutMedia(asset) => media.put(&asset),
            LocalJob::DeleteMedia(id) => media.delete(&id),
            LocalJob::ReplaceMedia(list) => {
                media.clear()?;
                for asset in &list {
                    media.put(asset)?;
                }
                Ok(())
            }
        }
    }
}

enum RecordJob {
    Write { uid: String, record: SelectionRecord },
    /// Read the record again and merge the toggles made while it was unreadable.
    Reconcile(LoadTicket),
}

/// Counts a bulk fetch as in flight for as long as it lives, including when
/// the fetch future is dropped before it finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reads the record for `uid`. `None` when it could not be read; a missing
/// record reads as empty selections.
async fn read_selections(records: &dyn SelectionRecords, uid: &str, limit: Duration) -> Option<Selections> {
    match timeout(limit, records.fetch(uid)).await {
        Ok(Ok(Some(record))) => Some(Selections::from_record(record)),
        Ok(Ok(None)) => {
            debug!("No record yet for {}", uid);
            Some(Selections::default())
        }
        Ok(Err(e)) => {
            warn!("Could not load selections for {}: {}", uid, e);
            None
        }
        Err(_) => {
            warn!("Loading selections for {} timed out", uid);
            None
        }
    }
}

async fn write_selections(records: &dyn SelectionRecords, uid: &str, record: &SelectionRecord, limit: Duration) {
    match timeout(limit, records.merge(uid, record)).await {
        Ok(Ok(())) => debug!("Saved selections for {}", uid),
        Ok(Err(e)) => warn!("Failed to save selections for {}: {}", uid, e),
        Err(_) => warn!("Saving selections for {} timed out", uid),
    }
}

#[derive(Clone, Copy)]
struct RetryPolicy {
    limit: Duration,
    attempts: u32,
    backoff: Duration,
}

/// Rereads the record until it is readable, then merges the offline toggles
/// into it and writes the result. Gives up early once the identity changes.
async fn reconcile_selections(
    session: &RwLock<Session>,
    records: &dyn SelectionRecords,
    ticket: LoadTicket,
    policy: RetryPolicy,
) {
    let attempts = policy.attempts.max(1);
    let mut delay = policy.backoff;
    for attempt in 1..=attempts {
        if !session.read().unwrap().is_current(&ticket) {
            debug!("Dropped reconcile for {}: identity changed", ticket.uid);
            return;
        }
        if let Some(fetched) = read_selections(records, &ticket.uid, policy.limit).await {
            let write = session.write().unwrap().reconcile(&ticket, fetched);
            if let Some(Followup::Write(uid, record)) = write {
                info!("Merged offline selections for {}", uid);
                write_selections(records, &uid, &record, policy.limit).await;
            }
            return;
        }
        if attempt < attempts {
            sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }
    warn!("Selections for {} still unreadable after {} attempts", ticket.uid, attempts);
    session.write().unwrap().reconcile_failed(&ticket);
}

/// Keeps the first item for every id.
fn dedupe_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let before = items.len();
    let out: Vec<T> = items.into_iter().filter(|i| seen.insert(id(i).to_string())).collect();
    if out.len() != before {
        warn!("Dropped {} entries with duplicate ids", before - out.len());
    }
    out
}

fn load_content(cache: &dyn SnapshotCache, media: &dyn MediaStore) -> Content {
    cache::purge_legacy(cache);
    let catalog = cache::load_or_default(cache, SnapshotKey::Catalog, defaults::catalog);
    let occasions = cache::load_or_default(cache, SnapshotKey::Occasions, defaults::occasions);
    let settings = cache::load_or_default(cache, SnapshotKey::Settings, defaults::settings);
    let mut media = media.load_all().unwrap_or_else(|e| {
        warn!("Could not load media library: {}", e);
        Vec::new()
    });
    sort_media(&mut media);

    Content {
        catalog: dedupe_by_id(catalog, |h| h.id.as_str()),
        occasions: dedupe_by_id(occasions, |o| o.id.as_str()),
        settings,
        media,
    }
}

/// The single in-memory authority over storefront state.
///
/// Every mutation applies to memory first and is visible to the next read.
/// Persistence happens behind the caller's back through ordered queues: one for
/// the local cache and media store, one for per-identity record writes, one for
/// media notifications to the bulk service.
pub struct StoreController {
    content: RwLock<Content>,
    session: Arc<RwLock<Session>>,
    backends: Backends,
    options: ControllerOptions,
    ready: AtomicBool,
    fetching: AtomicUsize,
    local: JobQueue<LocalJob>,
    remote: JobQueue<RecordJob>,
    forward: JobQueue<(String, MediaEvent)>,
}

impl StoreController {
    /// Loads every snapshot (falling back to defaults), applies migrations and
    /// starts the background writers. Must be called within a tokio runtime.
    pub async fn open(backends: Backends, options: ControllerOptions) -> Self {
        let cache = backends.cache.clone();
        let media = backends.media.clone();
        let mut content = match tokio::task::spawn_blocking(move || load_content(cache.as_ref(), media.as_ref())).await
        {
            Ok(c) => c,
            Err(e) => {
                error!("Snapshot loading task failed: {}", e);
                Content {
                    catalog: defaults::catalog(),
                    occasions: defaults::occasions(),
                    settings: defaults::settings(),
                    media: Vec::new(),
                }
            }
        };

        let migrated = migrate::apply_all(
            &options.migrations,
            MigrationTarget {
                catalog: &mut content.catalog,
                occasions: &mut content.occasions,
                settings: &mut content.settings,
            },
        );

        let local = {
            let cache = backends.cache.clone();
            let media = backends.media.clone();
            JobQueue::spawn("local cache", move |job: LocalJob| {
                let cache = cache.clone();
                let media = media.clone();
                async move {
                    let what = job.describe();
                    match tokio::task::spawn_blocking(move || job.apply(cache.as_ref(), media.as_ref())).await {
                        Ok(Ok(())) => debug!("Persisted {}", what),
                        Ok(Err(e)) => warn!("Failed to persist {}: {}", what, e),
                        Err(e) => error!("Persist task for {} failed: {}", what, e),
                    }
                }
            })
        };

        let session = Arc::new(RwLock::new(Session::default()));

        let remote = {
            let records = backends.records.clone();
            let session = session.clone();
            let policy = RetryPolicy {
                limit: options.remote_timeout,
                attempts: options.reconcile_attempts,
                backoff: options.reconcile_backoff,
            };
            JobQueue::spawn("selection records", move |job: RecordJob| {
                let records = records.clone();
                let session = session.clone();
                async move {
                    let Some(records) = records else {
                        return;
                    };
                    match job {
                        RecordJob::Write { uid, record } => {
                            write_selections(records.as_ref(), &uid, &record, policy.limit).await
                        }
                        RecordJob::Reconcile(ticket) => {
                            reconcile_selections(&session, records.as_ref(), ticket, policy).await
                        }
                    }
                }
            })
        };

        let forward = {
            let content = backends.content.clone();
            let limit = options.remote_timeout;
            JobQueue::spawn("media forward", move |(endpoint, event): (String, MediaEvent)| {
                let content = content.clone();
                async move {
                    let Some(service) = content else {
                        return;
                    };
                    match timeout(limit, service.notify_media(&endpoint, &event)).await {
                        Ok(Ok(())) => debug!("Forwarded media change to {}", endpoint),
                        Ok(Err(e)) => warn!("Media forward to {} failed: {}", endpoint, e),
                        Err(_) => warn!("Media forward to {} timed out", endpoint),
                    }
                }
            })
        };

        let controller = Self {
            content: RwLock::new(content),
            session,
            backends,
            options,
            ready: AtomicBool::new(false),
            fetching: AtomicUsize::new(0),
            local,
            remote,
            forward,
        };

        if migrated > 0 {
            let content = controller.content.read().unwrap();
            controller.persist(SnapshotKey::Catalog, &content.catalog);
            controller.persist(SnapshotKey::Occasions, &content.occasions);
            controller.persist(SnapshotKey::Settings, &content.settings);
        }

        controller.ready.store(true, Ordering::SeqCst);
        {
            let content = controller.content.read().unwrap();
            info!(
                "Store ready: {} catalog items, {} occasions, {} media assets",
                content.catalog.len(),
                content.occasions.len(),
                content.media.len()
            );
        }
        controller
    }

    /// Waits for every queued write to finish.
    pub async fn flush(&self) {
        self.local.wait().await;
        self.remote.wait().await;
        self.forward.wait().await;
        if let Some(records) = &self.backends.records {
            records.flush().await;
        }
    }

    /// Drains every queued write and shuts the controller down.
    pub async fn close(self) {
        self.flush().await;
        info!("Store closed");
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// True until initialization finishes and while a bulk fetch is in flight.
    pub fn is_loading(&self) -> bool {
        !self.is_ready() || self.fetching.load(Ordering::SeqCst) > 0
    }

    fn persist<T: Serialize + ?Sized>(&self, key: SnapshotKey, value: &T) {
        match cache::encode(value) {
            Ok(body) => self.local.push(LocalJob::Snapshot { key, body }),
            Err(e) => error!("Could not encode snapshot {}: {}", key.as_str(), e),
        }
    }

    // ========== Catalog ==========

    pub fn list_catalog(&self) -> Vec<CatalogItem> {
        self.content.read().unwrap().catalog.clone()
    }

    pub fn find_item(&self, id: &str) -> Option<CatalogItem> {
        self.content.read().unwrap().catalog.iter().find(|h| h.id == id).cloned()
    }

    fn filtered_catalog(&self, keep: impl Fn(&CatalogItem) -> bool) -> Vec<CatalogItem> {
        self.content.read().unwrap().catalog.iter().filter(|h| keep(h)).cloned().collect()
    }

    /// Items flagged for the primary listing.
    pub fn home_listing(&self) -> Vec<CatalogItem> {
        self.filtered_catalog(|h| h.show_on_home)
    }

    /// Items flagged for the full catalog page.
    pub fn catalog_listing(&self) -> Vec<CatalogItem> {
        self.filtered_catalog(|h| h.show_on_catalog)
    }

    pub fn highlighted(&self) -> Vec<CatalogItem> {
        self.filtered_catalog(|h| h.is_highlighted)
    }

    /// Appends `item`. Refused when its id is already taken.
    pub fn add_catalog_item(&self, item: CatalogItem) -> bool {
        let mut content = self.content.write().unwrap();
        if content.catalog.iter().any(|h| h.id == item.id) {
            warn!("Catalog item {} already exists", item.id);
            return false;
        }
        content.catalog.push(item);
        self.persist(SnapshotKey::Catalog, &content.catalog);
        true
    }

    /// Replaces the item with the same id in place. No-op when absent.
    pub fn update_catalog_item(&self, item: CatalogItem) -> bool {
        let mut content = self.content.write().unwrap();
        let Some(slot) = content.catalog.iter_mut().find(|h| h.id == item.id) else {
            return false;
        };
        *slot = item;
        self.persist(SnapshotKey::Catalog, &content.catalog);
        true
    }

    pub fn remove_catalog_item(&self, id: &str) -> bool {
        let mut content = self.content.write().unwrap();
        let before = content.catalog.len();
        content.catalog.retain(|h| h.id != id);
        if content.catalog.len() == before {
            return false;
        }
        self.persist(SnapshotKey::Catalog, &content.catalog);
        true
    }

    // ========== Occasions ==========

    pub fn list_occasions(&self) -> Vec<ContentCategory> {
        self.content.read().unwrap().occasions.clone()
    }

    pub fn add_occasion(&self, occasion: ContentCategory) -> bool {
        let mut content = self.content.write().unwrap();
        if content.occasions.iter().any(|o| o.id == occasion.id) {
            warn!("Occasion {} already exists", occasion.id);
            return false;
        }
        content.occasions.push(occasion);
        self.persist(SnapshotKey::Occasions, &content.occasions);
        true
    }

    pub fn update_occasion(&self, occasion: ContentCategory) -> bool {
        let mut content = self.content.write().unwrap();
        let Some(slot) = content.occasions.iter_mut().find(|o| o.id == occasion.id) else {
            return false;
        };
        *slot = occasion;
        self.persist(SnapshotKey::Occasions, &content.occasions);
        true
    }

    pub fn remove_occasion(&self, id: &str) -> bool {
        let mut content = self.content.write().unwrap();
        let before = content.occasions.len();
        content.occasions.retain(|o| o.id != id);
        if content.occasions.len() == before {
            return false;
        }
        self.persist(SnapshotKey::Occasions, &content.occasions);
        true
    }

    // ========== Settings ==========

    pub fn settings(&self) -> SiteContent {
        self.content.read().unwrap().settings.clone()
    }

    pub fn replace_settings(&self, settings: SiteContent) {
        let mut content = self.content.write().unwrap();
        content.settings = settings;
        self.persist(SnapshotKey::Settings, &content.settings);
    }

    /// The bulk endpoint in force: the configured override, else the one in settings.
    pub fn sync_endpoint(&self) -> Option<String> {
        let from_settings = self.content.read().unwrap().settings.sync_endpoint.clone();
        self.options
            .endpoint_override
            .clone()
            .or(from_settings)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
    }

    // ========== Media ==========

    /// Newest first.
    pub fn media_library(&self) -> Vec<MediaAsset> {
        self.content.read().unwrap().media.clone()
    }

    fn forward_upload(&self, asset: &MediaAsset) {
        if !self.options.forward_media || self.backends.content.is_none() {
            return;
        }
        let Some(upload) = MediaUpload::from_asset(asset) else {
            debug!("Media {} is not a base64 data URL, not forwarded", asset.id);
            return;
        };
        match self.sync_endpoint() {
            Some(endpoint) => self.forward.push((endpoint, MediaEvent::Upload(upload))),
            None => debug!("No bulk endpoint, media upload not forwarded"),
        }
    }

    /// Adds `asset` to the library, replacing any asset with the same id. The
    /// library stays ordered newest first.
    pub fn add_media_asset(&self, asset: MediaAsset) {
        {
            let mut content = self.content.write().unwrap();
            content.media.retain(|m| m.id != asset.id);
            content.media.push(asset.clone());
            sort_media(&mut content.media);
            self.local.push(LocalJob::PutMedia(asset.clone()));
        }
        self.forward_upload(&asset);
    }

    /// Removes the asset locally. Removals are not forwarded.
    pub fn remove_media_asset(&self, id: &str) -> bool {
        let mut content = self.content.write().unwrap();
        let before = content.media.len();
        content.media.retain(|m| m.id != id);
        if content.media.len() == before {
            return false;
        }
        self.local.push(LocalJob::DeleteMedia(id.to_string()));
        true
    }

    // ========== Identity & selections ==========

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.read().unwrap().identity().cloned()
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.session.read().unwrap().phase()
    }

    pub fn selections(&self) -> Selections {
        self.session.read().unwrap().selections().clone()
    }

    pub fn cart(&self) -> Vec<String> {
        self.session.read().unwrap().selections().cart.clone()
    }

    pub fn wishlist(&self) -> Vec<String> {
        self.session.read().unwrap().selections().wishlist.clone()
    }

    fn resolve(&self, ids: Vec<String>) -> Vec<CatalogItem> {
        let content = self.content.read().unwrap();
        ids.iter()
            .filter_map(|id| content.catalog.iter().find(|h| &h.id == id).cloned())
            .collect()
    }

    /// Cart entries resolved against the catalog; ids no longer in the catalog are skipped.
    pub fn cart_items(&self) -> Vec<CatalogItem> {
        let ids = self.cart();
        self.resolve(ids)
    }

    pub fn wishlist_items(&self) -> Vec<CatalogItem> {
        let ids = self.wishlist();
        self.resolve(ids)
    }

    /// Queues the remote work a session change asked for. Called with the
    /// session lock held so jobs are queued in the order the changes happened.
    fn dispatch(&self, followup: Option<Followup>) {
        let Some(followup) = followup else {
            return;
        };
        if self.backends.records.is_none() {
            return;
        }
        match followup {
            Followup::Write(uid, record) => self.remote.push(RecordJob::Write { uid, record }),
            Followup::Reconcile(ticket) => {
                debug!("Queued reconcile of offline selections for {}", ticket.uid);
                self.remote.push(RecordJob::Reconcile(ticket))
            }
        }
    }

    fn toggle(&self, kind: SelectionKind, id: &str) -> Option<bool> {
        let mut session = self.session.write().unwrap();
        let Some(toggled) = session.toggle(kind, id) else {
            debug!("Ignoring {:?} toggle for {}: no active identity", kind, id);
            return None;
        };
        self.dispatch(toggled.followup);
        Some(toggled.member)
    }

    /// Flips `id` in the cart. Returns the new membership, or `None` when
    /// nobody is signed in.
    ///
    /// Toggles made before the identity's record is known (while loading, or
    /// while the record is unreadable) are merged into the record once it is
    /// read, then written back.
    pub fn toggle_cart(&self, id: &str) -> Option<bool> {
        self.toggle(SelectionKind::Cart, id)
    }

    pub fn toggle_wishlist(&self, id: &str) -> Option<bool> {
        self.toggle(SelectionKind::Wishlist, id)
    }

    /// First half of an identity transition: clears the selections and
    /// invalidates any fetch still in flight.
    pub fn begin_identity(&self, identity: Option<Identity>) -> Option<LoadTicket> {
        let mut session = self.session.write().unwrap();
        match &identity {
            Some(i) => info!("Identity acquired: {}", i.uid),
            None => info!("Identity lost, selections cleared"),
        }
        session.begin(identity)
    }

    /// Second half: fetches the record and adopts it unless a later transition
    /// happened meanwhile.
    pub async fn complete_identity(&self, ticket: LoadTicket) {
        let fetched = match &self.backends.records {
            None => Some(Selections::default()),
            Some(records) => read_selections(records.as_ref(), &ticket.uid, self.options.remote_timeout).await,
        };

        let mut session = self.session.write().unwrap();
        match session.adopt(&ticket, fetched) {
            Adoption::Stale => debug!("Discarded stale selections for {}", ticket.uid),
            Adoption::Adopted(followup) => self.dispatch(followup),
        }
    }

    /// Runs a whole identity transition.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        if let Some(ticket) = self.begin_identity(identity) {
            self.complete_identity(ticket).await;
        }
    }

    /// Follows an identity stream until its sender goes away.
    ///
    /// Transitions begin in arrival order; their record fetches run
    /// concurrently and only the latest one is adopted.
    pub fn follow(self: &Arc<Self>, mut rx: watch::Receiver<Option<Identity>>) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let initial = rx.borrow_and_update().clone();
            let mut next = Some(initial);
            loop {
                let identity = match next.take() {
                    Some(identity) => identity,
                    None => {
                        if rx.changed().await.is_err() {
                            break;
                        }
                        let current = rx.borrow_and_update().clone();
                        current
                    }
                };
                if let Some(ticket) = controller.begin_identity(identity) {
                    let c = controller.clone();
                    tokio::spawn(async move { c.complete_identity(ticket).await });
                }
            }
            debug!("Identity stream closed");
        })
    }

    // ========== Bulk publish / fetch ==========

    pub fn snapshot_data(&self) -> SnapshotData {
        let content = self.content.read().unwrap();
        SnapshotData {
            hampers: content.catalog.clone(),
            occasions: content.occasions.clone(),
            settings: content.settings.clone(),
            media: content.media.clone(),
        }
    }

    /// Sends the whole snapshot to the bulk content service.
    pub async fn publish_to_remote(&self) -> PublishOutcome {
        let Some(service) = self.backends.content.clone() else {
            return PublishOutcome::Failed(Error::ServiceUnavailable.to_string());
        };
        let Some(endpoint) = self.sync_endpoint() else {
            return PublishOutcome::Failed(Error::NoEndpoint.to_string());
        };

        let envelope = SyncEnvelope::sync_all(self.snapshot_data());
        match timeout(self.options.remote_timeout, service.push(&endpoint, &envelope)).await {
            Ok(Ok(PushAck::Confirmed)) => {
                info!("Published snapshot to {}", endpoint);
                PublishOutcome::Confirmed
            }
            Ok(Ok(PushAck::Opaque)) => {
                info!("Published snapshot to {} (unconfirmed)", endpoint);
                PublishOutcome::Dispatched
            }
            Ok(Err(e)) => {
                warn!("Publish to {} failed: {}", endpoint, e);
                PublishOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!("Publish to {} timed out", endpoint);
                PublishOutcome::TimedOut
            }
        }
    }

    /// Replaces each collection the service returns. On any error memory is
    /// left as it was.
    pub async fn fetch_from_remote(&self) -> Result<FetchSummary> {
        let service = self.backends.content.clone().ok_or(Error::ServiceUnavailable)?;
        let endpoint = self.sync_endpoint().ok_or(Error::NoEndpoint)?;

        let result = {
            let _in_flight = InFlight::enter(&self.fetching);
            timeout(self.options.remote_timeout, service.pull(&endpoint)).await
        };

        let snapshot = match result {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!("Fetch from {} failed: {}", endpoint, e);
                return Err(e);
            }
            Err(_) => {
                warn!("Fetch from {} timed out", endpoint);
                return Err(Error::Timeout);
            }
        };

        let summary = self.adopt_remote(snapshot);
        info!("Fetched snapshot from {}: {:?}", endpoint, summary);
        Ok(summary)
    }

    fn adopt_remote(&self, snapshot: RemoteSnapshot) -> FetchSummary {
        let mut summary = FetchSummary::default();
        let mut content = self.content.write().unwrap();

        if let Some(catalog) = snapshot.hampers {
            content.catalog = dedupe_by_id(catalog, |h| h.id.as_str());
            summary.catalog = Some(content.catalog.len());
            self.persist(SnapshotKey::Catalog, &content.catalog);
        }
        if let Some(occasions) = snapshot.occasions {
            content.occasions = dedupe_by_id(occasions, |o| o.id.as_str());
            summary.occasions = Some(content.occasions.len());
            self.persist(SnapshotKey::Occasions, &content.occasions);
        }
        if let Some(settings) = snapshot.settings {
            content.settings = settings;
            summary.settings = true;
            self.persist(SnapshotKey::Settings, &content.settings);
        }
        if let Some(media) = snapshot.media {
            content.media = dedupe_by_id(media, |m| m.id.as_str());
            sort_media(&mut content.media);
            summary.media = Some(content.media.len());
            self.local.push(LocalJob::ReplaceMedia(content.media.clone()));
        }
        summary
    }
}
