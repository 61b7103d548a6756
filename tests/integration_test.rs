use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use trunk_store::cache::{FileMediaStore, MemoryCache, MemoryMediaStore, SnapshotKey, LEGACY_KEYS};
use trunk_store::content::{HttpContentService, MediaEvent, PushAck, RemoteSnapshot, SyncEnvelope};
use trunk_store::engine::{Backends, ControllerOptions, PublishOutcome, SessionPhase, StoreController};
use trunk_store::identity::{Identity, IdentityHub};
use trunk_store::model::{CatalogItem, ContentCategory, MediaAsset, MediaKind, SelectionRecord};
use trunk_store::records::{DocStore, RecordClient, Router, USERS};
use trunk_store::{defaults, ContentService, Error, MediaStore, Result, SelectionRecords, SnapshotCache};

// ========== Fakes ==========

#[derive(Default)]
struct FakeRecords {
    docs: Mutex<HashMap<String, SelectionRecord>>,
    writes: Mutex<Vec<(String, SelectionRecord)>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    fail: AtomicBool,
}

impl FakeRecords {
    fn seed(&self, uid: &str, cart: &[&str], wishlist: &[&str]) {
        let record = SelectionRecord {
            cart: Some(cart.iter().map(|s| s.to_string()).collect()),
            wishlist: Some(wishlist.iter().map(|s| s.to_string()).collect()),
        };
        self.docs.lock().unwrap().insert(uid.to_string(), record);
    }

    /// Holds fetches for `uid` until the returned gate is notified.
    fn gate(&self, uid: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(uid.to_string(), gate.clone());
        gate
    }

    fn doc(&self, uid: &str) -> Option<SelectionRecord> {
        self.docs.lock().unwrap().get(uid).cloned()
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl SelectionRecords for FakeRecords {
    async fn fetch(&self, uid: &str) -> Result<Option<SelectionRecord>> {
        let gate = self.gates.lock().unwrap().get(uid).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Remote("record service unreachable".to_string()));
        }
        Ok(self.doc(uid))
    }

    async fn merge(&self, uid: &str, record: &SelectionRecord) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Remote("record service unreachable".to_string()));
        }
        {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.entry(uid.to_string()).or_default();
            if let Some(cart) = &record.cart {
                doc.cart = Some(cart.clone());
            }
            if let Some(wishlist) = &record.wishlist {
                doc.wishlist = Some(wishlist.clone());
            }
        }
        self.writes.lock().unwrap().push((uid.to_string(), record.clone()));
        Ok(())
    }
}

struct FakeContent {
    ack: PushAck,
    snapshot: Mutex<RemoteSnapshot>,
    pushed: Mutex<Vec<Value>>,
    media_events: Mutex<Vec<Value>>,
    delay: Option<Duration>,
    fail: bool,
}

impl FakeContent {
    fn new(ack: PushAck) -> Self {
        Self {
            ack,
            snapshot: Mutex::new(RemoteSnapshot::default()),
            pushed: Mutex::new(Vec::new()),
            media_events: Mutex::new(Vec::new()),
            delay: None,
            fail: false,
        }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::new(PushAck::Confirmed) }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new(PushAck::Confirmed) }
    }

    fn serving(snapshot: RemoteSnapshot) -> Self {
        let content = Self::new(PushAck::Confirmed);
        *content.snapshot.lock().unwrap() = snapshot;
        content
    }

    async fn pause(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Remote("500 Internal Server Error".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentService for FakeContent {
    async fn push(&self, _endpoint: &str, envelope: &SyncEnvelope) -> Result<PushAck> {
        self.pause().await?;
        self.pushed.lock().unwrap().push(serde_json::to_value(envelope)?);
        Ok(self.ack)
    }

    async fn pull(&self, _endpoint: &str) -> Result<RemoteSnapshot> {
        self.pause().await?;
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn notify_media(&self, _endpoint: &str, event: &MediaEvent) -> Result<()> {
        self.pause().await?;
        self.media_events.lock().unwrap().push(serde_json::to_value(event)?);
        Ok(())
    }
}

struct BrokenCache;

impl SnapshotCache for BrokenCache {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "storage disabled")))
    }
    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded")))
    }
    fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "storage disabled")))
    }
}

struct BrokenMedia;

impl MediaStore for BrokenMedia {
    fn load_all(&self) -> Result<Vec<MediaAsset>> {
        Err(Error::Internal("media store unavailable".to_string()))
    }
    fn put(&self, _asset: &MediaAsset) -> Result<()> {
        Err(Error::Internal("media store unavailable".to_string()))
    }
    fn delete(&self, _id: &str) -> Result<()> {
        Err(Error::Internal("media store unavailable".to_string()))
    }
    fn clear(&self) -> Result<()> {
        Err(Error::Internal("media store unavailable".to_string()))
    }
}

// ========== Helpers ==========

const ENDPOINT: &str = "https://content.example/exec";

fn options_with_endpoint() -> ControllerOptions {
    ControllerOptions {
        endpoint_override: Some(ENDPOINT.to_string()),
        ..ControllerOptions::default()
    }
}

/// Rereads an unreadable record quickly so tests do not wait on backoff.
fn quick_reconcile(attempts: u32) -> ControllerOptions {
    ControllerOptions {
        reconcile_attempts: attempts,
        reconcile_backoff: Duration::from_millis(10),
        ..ControllerOptions::default()
    }
}

fn asset(id: &str, minute: u32) -> MediaAsset {
    MediaAsset {
        id: id.to_string(),
        url: format!("data:image/png;base64,{}", id),
        name: format!("{}.png", id),
        kind: MediaKind::Gallery,
        uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
    }
}

fn ids(items: &[CatalogItem]) -> Vec<String> {
    items.iter().map(|h| h.id.clone()).collect()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ========== Local persistence ==========

#[tokio::test]
async fn test_mutations_survive_restart() {
    let cache = Arc::new(MemoryCache::new());
    let media = Arc::new(MemoryMediaStore::new());

    let store = StoreController::open(Backends::new(cache.clone(), media.clone()), ControllerOptions::default()).await;
    let mut item = CatalogItem::new("hamp-50", "Saffron Trunk", "2500");
    item.show_on_home = true;
    assert!(store.add_catalog_item(item));
    assert!(store.remove_catalog_item("hamp-2"));
    assert!(store.remove_occasion("occ-6"));
    let mut settings = store.settings();
    settings.hero_title = "Hampers for every blessing".to_string();
    store.replace_settings(settings);
    store.add_media_asset(asset("m1", 1));
    store.add_media_asset(asset("m2", 2));

    let catalog = store.list_catalog();
    let occasions = store.list_occasions();
    let settings = store.settings();
    let library = store.media_library();
    store.close().await;

    let reopened = StoreController::open(Backends::new(cache, media), ControllerOptions::default()).await;
    assert_eq!(reopened.list_catalog(), catalog);
    assert_eq!(reopened.list_occasions(), occasions);
    assert_eq!(reopened.settings(), settings);
    assert_eq!(reopened.media_library(), library);
    assert_eq!(
        reopened.media_library().iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        vec!["m2", "m1"]
    );
}

#[tokio::test]
async fn test_startup_repairs_cached_snapshots() {
    let cache = Arc::new(MemoryCache::new());
    let mut stale = defaults::catalog();
    stale[0].image = "https://example.com/broken.jpg".to_string();
    stale.push(stale[1].clone());
    cache.set(SnapshotKey::Catalog.as_str(), &serde_json::to_string(&stale).unwrap()).unwrap();
    cache.set(SnapshotKey::Occasions.as_str(), "{corrupt").unwrap();
    for key in LEGACY_KEYS {
        cache.set(key, "[]").unwrap();
    }

    let store =
        StoreController::open(Backends::new(cache.clone(), Arc::new(MemoryMediaStore::new())), ControllerOptions::default())
            .await;
    store.flush().await;

    let catalog = store.list_catalog();
    assert_eq!(ids(&catalog), ids(&defaults::catalog()));
    assert!(catalog[0].image.contains("pinimg.com"));
    assert_eq!(store.list_occasions(), defaults::occasions());
    for key in LEGACY_KEYS {
        assert!(cache.get(key).unwrap().is_none());
    }

    let persisted: Vec<CatalogItem> =
        serde_json::from_str(&cache.get(SnapshotKey::Catalog.as_str()).unwrap().unwrap()).unwrap();
    assert_eq!(persisted, catalog);
}

// ========== Identity & selections ==========

#[tokio::test]
async fn test_identity_switch_never_leaks() {
    let records = Arc::new(FakeRecords::default());
    records.seed("alice", &["hamp-1"], &["hamp-3"]);
    records.seed("bob", &["hamp-2"], &[]);
    let store = StoreController::open(Backends::in_memory().with_records(records.clone()), ControllerOptions::default()).await;

    assert_eq!(store.session_phase(), SessionPhase::Anonymous);
    assert_eq!(store.toggle_cart("hamp-1"), None);

    store.set_identity(Some(Identity::customer("alice"))).await;
    assert_eq!(store.session_phase(), SessionPhase::Ready);
    assert_eq!(store.cart(), vec!["hamp-1".to_string()]);
    assert_eq!(store.wishlist(), vec!["hamp-3".to_string()]);

    let ticket = store.begin_identity(Some(Identity::customer("bob"))).unwrap();
    assert!(store.cart().is_empty());
    assert!(store.wishlist().is_empty());
    store.complete_identity(ticket).await;
    assert_eq!(store.cart(), vec!["hamp-2".to_string()]);
    assert!(store.wishlist().is_empty());

    store.set_identity(None).await;
    assert_eq!(store.session_phase(), SessionPhase::Anonymous);
    assert!(store.cart().is_empty());
    assert!(store.current_identity().is_none());
    assert_eq!(records.write_count(), 0);
}

#[tokio::test]
async fn test_rapid_toggles_land_in_order() {
    let records = Arc::new(FakeRecords::default());
    let store = StoreController::open(Backends::in_memory().with_records(records.clone()), ControllerOptions::default()).await;
    store.set_identity(Some(Identity::customer("u1"))).await;

    assert_eq!(store.toggle_cart("hamp-1"), Some(true));
    assert_eq!(store.toggle_cart("hamp-2"), Some(true));
    assert_eq!(store.toggle_cart("hamp-1"), Some(false));
    assert_eq!(store.toggle_wishlist("hamp-3"), Some(true));
    store.flush().await;

    assert_eq!(records.write_count(), 4);
    let doc = records.doc("u1").unwrap();
    assert_eq!(doc, store.selections().to_record());
    assert_eq!(doc.cart, Some(vec!["hamp-2".to_string()]));
    assert_eq!(doc.wishlist, Some(vec!["hamp-3".to_string()]));

    let items = store.cart_items();
    assert_eq!(ids(&items), vec!["hamp-2".to_string()]);
}

#[tokio::test]
async fn test_login_adopts_record_then_merges_toggle() {
    let records = Arc::new(FakeRecords::default());
    records.docs.lock().unwrap().insert(
        "u1".to_string(),
        SelectionRecord { cart: Some(vec!["h1".to_string()]), wishlist: None },
    );
    let store = StoreController::open(Backends::in_memory().with_records(records.clone()), ControllerOptions::default()).await;

    store.set_identity(Some(Identity::customer("u1"))).await;
    assert_eq!(store.cart(), vec!["h1".to_string()]);
    assert!(store.wishlist().is_empty());

    assert_eq!(store.toggle_cart("h2"), Some(true));
    store.flush().await;
    let writes = records.writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1.cart, Some(vec!["h1".to_string(), "h2".to_string()]));

    store.set_identity(None).await;
    store.flush().await;
    assert_eq!(records.write_count(), 1);
    assert!(store.cart().is_empty());
}

#[tokio::test]
async fn test_stale_fetch_is_discarded() {
    let records = Arc::new(FakeRecords::default());
    records.seed("slow", &["hamp-1"], &[]);
    records.seed("fast", &["hamp-4"], &[]);
    let gate = records.gate("slow");
    let store = Arc::new(
        StoreController::open(Backends::in_memory().with_records(records.clone()), ControllerOptions::default()).await,
    );

    let ticket = store.begin_identity(Some(Identity::customer("slow"))).unwrap();
    let s = store.clone();
    let late = tokio::spawn(async move { s.complete_identity(ticket).await });

    store.set_identity(Some(Identity::customer("fast"))).await;
    gate.notify_one();
    late.await.unwrap();

    assert_eq!(store.current_identity().map(|i| i.uid), Some("fast".to_string()));
    assert_eq!(store.cart(), vec!["hamp-4".to_string()]);
    assert_eq!(store.session_phase(), SessionPhase::Ready);
}

#[tokio::test]
async fn test_follow_tracks_identity_hub() {
    let records = Arc::new(FakeRecords::default());
    records.seed("owner-uid", &["hamp-11"], &[]);
    let store = Arc::new(
        StoreController::open(Backends::in_memory().with_records(records.clone()), ControllerOptions::default()).await,
    );
    let hub = IdentityHub::new(store.settings().owner_email);
    let handle = store.follow(hub.subscribe());

    let owner_email = store.settings().owner_email;
    let identity = hub.sign_in("owner-uid", Some(owner_email.to_uppercase()), false);
    assert!(identity.is_owner());
    wait_until(|| store.session_phase() == SessionPhase::Ready).await;
    assert_eq!(store.cart(), vec!["hamp-11".to_string()]);
    assert!(store.current_identity().unwrap().is_owner());

    hub.sign_out();
    wait_until(|| store.session_phase() == SessionPhase::Anonymous).await;
    assert!(store.cart().is_empty());

    drop(hub);
    handle.await.unwrap();
}

// ========== Failure containment ==========

#[tokio::test]
async fn test_broken_backends_are_contained() {
    let records = Arc::new(FakeRecords::default());
    records.seed("u1", &["hamp-1"], &[]);
    records.fail.store(true, Ordering::SeqCst);
    let backends = Backends::new(Arc::new(BrokenCache), Arc::new(BrokenMedia))
        .with_records(records.clone())
        .with_content(Arc::new(FakeContent::failing()));
    let options = ControllerOptions {
        endpoint_override: Some(ENDPOINT.to_string()),
        ..quick_reconcile(2)
    };
    let store = StoreController::open(backends, options).await;

    assert!(store.is_ready());
    assert_eq!(ids(&store.list_catalog()), ids(&defaults::catalog()));
    assert!(store.media_library().is_empty());

    assert!(store.add_catalog_item(CatalogItem::new("hamp-77", "Date Box", "900")));
    store.add_media_asset(asset("m1", 0));
    store.set_identity(Some(Identity::customer("u1"))).await;
    assert_eq!(store.session_phase(), SessionPhase::Offline);
    assert_eq!(store.toggle_cart("hamp-77"), Some(true));
    store.flush().await;

    assert!(store.find_item("hamp-77").is_some());
    assert_eq!(store.media_library().len(), 1);
    assert_eq!(store.cart(), vec!["hamp-77".to_string()]);
    assert_eq!(store.session_phase(), SessionPhase::Offline);
    assert_eq!(records.write_count(), 0);

    let before = store.list_catalog();
    assert!(matches!(store.publish_to_remote().await, PublishOutcome::Failed(_)));
    assert!(store.fetch_from_remote().await.is_err());
    assert_eq!(store.list_catalog(), before);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_offline_toggles_merge_when_records_recover() {
    let records = Arc::new(FakeRecords::default());
    records.seed("u1", &["x"], &[]);
    records.fail.store(true, Ordering::SeqCst);
    let store = StoreController::open(Backends::in_memory().with_records(records.clone()), quick_reconcile(1)).await;

    store.set_identity(Some(Identity::customer("u1"))).await;
    assert_eq!(store.session_phase(), SessionPhase::Offline);
    assert_eq!(store.toggle_cart("a"), Some(true));
    store.flush().await;
    assert_eq!(store.session_phase(), SessionPhase::Offline);
    assert_eq!(records.write_count(), 0);

    records.fail.store(false, Ordering::SeqCst);
    assert_eq!(store.toggle_cart("b"), Some(true));
    store.flush().await;

    assert_eq!(store.session_phase(), SessionPhase::Ready);
    let expected = vec!["x".to_string(), "a".to_string(), "b".to_string()];
    assert_eq!(store.cart(), expected);
    assert_eq!(records.doc("u1").unwrap().cart, Some(expected));
    assert_eq!(records.write_count(), 1);

    // Back to ordinary write-through.
    assert_eq!(store.toggle_cart("x"), Some(false));
    store.flush().await;
    assert_eq!(records.doc("u1").unwrap().cart, Some(vec!["a".to_string(), "b".to_string()]));
}

#[tokio::test]
async fn test_offline_toggle_lands_once_service_returns_during_retries() {
    let records = Arc::new(FakeRecords::default());
    records.seed("u1", &["x"], &["w"]);
    records.fail.store(true, Ordering::SeqCst);
    let store = StoreController::open(Backends::in_memory().with_records(records.clone()), quick_reconcile(50)).await;

    store.set_identity(Some(Identity::customer("u1"))).await;
    assert_eq!(store.toggle_wishlist("w2"), Some(true));
    tokio::time::sleep(Duration::from_millis(40)).await;
    records.fail.store(false, Ordering::SeqCst);
    store.flush().await;

    assert_eq!(store.session_phase(), SessionPhase::Ready);
    let doc = records.doc("u1").unwrap();
    assert_eq!(doc.cart, Some(vec!["x".to_string()]));
    assert_eq!(doc.wishlist, Some(vec!["w".to_string(), "w2".to_string()]));
}

#[tokio::test]
async fn test_toggle_while_loading_is_kept() {
    let records = Arc::new(FakeRecords::default());
    records.seed("u1", &["x"], &[]);
    let gate = records.gate("u1");
    let store = Arc::new(
        StoreController::open(Backends::in_memory().with_records(records.clone()), ControllerOptions::default()).await,
    );

    let ticket = store.begin_identity(Some(Identity::customer("u1"))).unwrap();
    let s = store.clone();
    let loading = tokio::spawn(async move { s.complete_identity(ticket).await });

    assert_eq!(store.session_phase(), SessionPhase::Loading);
    assert_eq!(store.toggle_cart("a"), Some(true));
    assert_eq!(records.write_count(), 0);

    gate.notify_one();
    loading.await.unwrap();
    store.flush().await;

    let expected = vec!["x".to_string(), "a".to_string()];
    assert_eq!(store.session_phase(), SessionPhase::Ready);
    assert_eq!(store.cart(), expected);
    assert_eq!(records.doc("u1").unwrap().cart, Some(expected));
}

#[tokio::test]
async fn test_reconcile_dropped_after_sign_out() {
    let records = Arc::new(FakeRecords::default());
    records.fail.store(true, Ordering::SeqCst);
    let store = StoreController::open(Backends::in_memory().with_records(records.clone()), quick_reconcile(50)).await;

    store.set_identity(Some(Identity::customer("u1"))).await;
    store.toggle_cart("a");
    store.set_identity(None).await;
    records.fail.store(false, Ordering::SeqCst);
    store.flush().await;

    assert_eq!(records.write_count(), 0);
    assert!(records.doc("u1").is_none());
}

// ========== Bulk publish / fetch ==========

#[tokio::test]
async fn test_publish_sends_whole_snapshot() {
    let content = Arc::new(FakeContent::new(PushAck::Confirmed));
    let store = StoreController::open(Backends::in_memory().with_content(content.clone()), ControllerOptions::default()).await;

    assert_eq!(store.publish_to_remote().await, PublishOutcome::Failed(Error::NoEndpoint.to_string()));

    let mut settings = store.settings();
    settings.sync_endpoint = Some(ENDPOINT.to_string());
    store.replace_settings(settings);
    store.add_media_asset(asset("m1", 3));

    let outcome = store.publish_to_remote().await;
    assert_eq!(outcome, PublishOutcome::Confirmed);
    assert!(outcome.is_success());

    let pushed = content.pushed.lock().unwrap();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0]["action"], json!("syncAll"));
    let data = &pushed[0]["data"];
    assert_eq!(data["hampers"].as_array().unwrap().len(), store.list_catalog().len());
    assert_eq!(data["occasions"].as_array().unwrap().len(), store.list_occasions().len());
    assert_eq!(data["settings"]["gasEndpoint"], json!(ENDPOINT));
    assert_eq!(data["media"][0]["id"], json!("m1"));
}

#[tokio::test]
async fn test_publish_unreadable_answer_is_dispatched() {
    let content = Arc::new(FakeContent::new(PushAck::Opaque));
    let store = StoreController::open(Backends::in_memory().with_content(content), options_with_endpoint()).await;
    let outcome = store.publish_to_remote().await;
    assert_eq!(outcome, PublishOutcome::Dispatched);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_publish_times_out() {
    let content = Arc::new(FakeContent::slow(Duration::from_millis(500)));
    let options = ControllerOptions {
        remote_timeout: Duration::from_millis(50),
        ..options_with_endpoint()
    };
    let store = StoreController::open(Backends::in_memory().with_content(content), options).await;
    assert_eq!(store.publish_to_remote().await, PublishOutcome::TimedOut);
    assert!(matches!(store.fetch_from_remote().await, Err(Error::Timeout)));
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_abandoned_fetch_clears_loading() {
    let content = Arc::new(FakeContent::slow(Duration::from_millis(500)));
    let store = StoreController::open(Backends::in_memory().with_content(content), options_with_endpoint()).await;

    tokio::select! {
        _ = store.fetch_from_remote() => panic!("fetch should still be pending"),
        _ = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(store.is_loading());
        } => {}
    }
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_fetch_replaces_only_returned_collections() {
    let occasions = vec![ContentCategory {
        id: "occ-20".to_string(),
        title: "Ramadan".to_string(),
        image: String::new(),
    }];
    let content = Arc::new(FakeContent::serving(RemoteSnapshot {
        occasions: Some(occasions.clone()),
        media: Some(vec![asset("remote-1", 9), asset("remote-1", 8)]),
        ..RemoteSnapshot::default()
    }));
    let cache = Arc::new(MemoryCache::new());
    let media = Arc::new(MemoryMediaStore::new());
    let backends = Backends::new(cache.clone(), media.clone()).with_content(content);
    let store = StoreController::open(backends, options_with_endpoint()).await;
    store.add_media_asset(asset("local-1", 1));
    let catalog = store.list_catalog();

    let summary = store.fetch_from_remote().await.unwrap();
    assert_eq!(summary.occasions, Some(1));
    assert_eq!(summary.media, Some(1));
    assert_eq!(summary.catalog, None);
    assert!(!summary.settings);

    assert_eq!(store.list_catalog(), catalog);
    assert_eq!(store.list_occasions(), occasions);
    store.flush().await;

    let cached: Vec<ContentCategory> =
        serde_json::from_str(&cache.get(SnapshotKey::Occasions.as_str()).unwrap().unwrap()).unwrap();
    assert_eq!(cached, occasions);
    let stored = media.load_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "remote-1");
}

#[tokio::test]
async fn test_fetched_media_order_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let content = Arc::new(FakeContent::serving(RemoteSnapshot {
        media: Some(vec![asset("older", 1), asset("newest", 30), asset("middle", 15)]),
        ..RemoteSnapshot::default()
    }));
    let media = Arc::new(FileMediaStore::new(dir.path()).unwrap());
    let backends = Backends::new(Arc::new(MemoryCache::new()), media).with_content(content);
    let store = StoreController::open(backends, options_with_endpoint()).await;

    store.fetch_from_remote().await.unwrap();
    let library = store.media_library();
    assert_eq!(
        library.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        vec!["newest", "middle", "older"]
    );
    store.close().await;

    let media = Arc::new(FileMediaStore::new(dir.path()).unwrap());
    let reopened = StoreController::open(Backends::new(Arc::new(MemoryCache::new()), media), ControllerOptions::default()).await;
    assert_eq!(reopened.media_library(), library);
}

#[tokio::test]
async fn test_media_uploads_forwarded_when_enabled() {
    let content = Arc::new(FakeContent::new(PushAck::Confirmed));
    let options = ControllerOptions {
        forward_media: true,
        ..options_with_endpoint()
    };
    let store = StoreController::open(Backends::in_memory().with_content(content.clone()), options).await;

    store.add_media_asset(asset("m1", 0));
    let mut linked = asset("m2", 1);
    linked.url = "https://cdn.example/m2.png".to_string();
    store.add_media_asset(linked);
    assert!(store.remove_media_asset("m1"));
    assert!(!store.remove_media_asset("m1"));
    store.flush().await;

    let events = content.media_events.lock().unwrap();
    assert_eq!(
        *events,
        vec![json!({
            "action": "upload",
            "data": { "filename": "m1.png", "mimeType": "image/png", "base64": "m1" }
        })]
    );
}

// ========== Record daemon ==========

async fn spawn_daemon(store: Arc<DocStore>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new(store);
    tokio::spawn(async move {
        let _ = router.serve(listener).await;
    });
    addr.to_string()
}

#[tokio::test]
async fn test_selections_through_record_daemon() {
    let docs = Arc::new(DocStore::new(HashMap::new(), None));
    let mut profile = serde_json::Map::new();
    profile.insert("email".to_string(), json!("alice@example.com"));
    docs.merge_fields(USERS, "alice", profile).await.unwrap();
    let addr = spawn_daemon(docs.clone()).await;

    let client = Arc::new(RecordClient::connect(&addr).await.unwrap());
    client.ping().await.unwrap();
    let store = StoreController::open(Backends::in_memory().with_records(client.clone()), ControllerOptions::default()).await;

    store.set_identity(Some(Identity::customer("alice"))).await;
    assert_eq!(store.session_phase(), SessionPhase::Ready);
    assert!(store.cart().is_empty());

    store.toggle_cart("hamp-1");
    store.toggle_wishlist("hamp-2");
    store.flush().await;

    let doc = docs.get(USERS, "alice").await.unwrap();
    assert_eq!(doc["cart"], json!(["hamp-1"]));
    assert_eq!(doc["wishlist"], json!(["hamp-2"]));
    assert_eq!(doc["email"], json!("alice@example.com"));
    assert_eq!(client.list_documents(USERS).await.unwrap(), vec!["alice".to_string()]);

    assert!(matches!(client.get_document(USERS, "nobody").await, Err(Error::DocumentNotFound)));
    assert_eq!(client.fetch("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_daemon_goes_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let store = StoreController::open(
        Backends::in_memory().with_records(Arc::new(RecordClient::lazy(&addr))),
        quick_reconcile(1),
    )
    .await;
    store.set_identity(Some(Identity::customer("u1"))).await;
    assert_eq!(store.session_phase(), SessionPhase::Offline);
    assert_eq!(store.toggle_cart("hamp-1"), Some(true));
    store.flush().await;
    assert_eq!(store.session_phase(), SessionPhase::Offline);
    assert_eq!(store.cart(), vec!["hamp-1".to_string()]);
}

// ========== HTTP content service ==========

/// Answers exactly one HTTP request and hands back what it received.
async fn respond_once(status: &'static str, extra_headers: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/exec", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            extra_headers,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&raw).to_string()
    });
    (url, handle)
}

fn sample_envelope() -> SyncEnvelope {
    SyncEnvelope::sync_all(trunk_store::content::SnapshotData {
        hampers: defaults::catalog(),
        occasions: defaults::occasions(),
        settings: defaults::settings(),
        media: vec![],
    })
}

#[tokio::test]
async fn test_http_push_success_and_redirect() {
    let service = HttpContentService::new(Duration::from_secs(5)).unwrap();

    let (url, request) = respond_once("200 OK", "", "{\"status\":\"success\"}").await;
    assert_eq!(service.push(&url, &sample_envelope()).await.unwrap(), PushAck::Confirmed);
    let request = request.await.unwrap();
    assert!(request.starts_with("POST /exec"));
    assert!(request.contains("\"action\":\"syncAll\""));

    let (url, _request) = respond_once("302 Found", "Location: http://127.0.0.1:9/result\r\n", "").await;
    assert_eq!(service.push(&url, &sample_envelope()).await.unwrap(), PushAck::Opaque);

    let (url, _request) = respond_once("500 Internal Server Error", "", "boom").await;
    assert!(matches!(service.push(&url, &sample_envelope()).await, Err(Error::Remote(_))));
}

#[tokio::test]
async fn test_http_pull_parses_partial_snapshot() {
    let service = HttpContentService::new(Duration::from_secs(5)).unwrap();
    let (url, request) = respond_once(
        "200 OK",
        "",
        "{\"occasions\":[{\"id\":\"occ-1\",\"title\":\"Eid\",\"image\":\"\"}],\"settings\":{\"heroTitle\":\"Remote\"}}",
    )
    .await;

    let snapshot = service.pull(&url).await.unwrap();
    assert!(request.await.unwrap().starts_with("GET /exec?action=getData"));
    assert!(snapshot.hampers.is_none());
    assert_eq!(snapshot.occasions.unwrap()[0].title, "Eid");
    let settings = snapshot.settings.unwrap();
    assert_eq!(settings.hero_title, "Remote");
    assert_eq!(settings.phone_number, defaults::settings().phone_number);
}

#[tokio::test]
async fn test_http_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/exec", listener.local_addr().unwrap());
    drop(listener);

    let service = HttpContentService::new(Duration::from_secs(2)).unwrap();
    assert!(matches!(service.push(&url, &sample_envelope()).await, Err(Error::Http(_))));
    assert!(service.pull(&url).await.is_err());
}
