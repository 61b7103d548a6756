//! Trunk Store is the local-first state layer behind a gift-hamper storefront.
//!
//! A single [`engine::StoreController`] owns the catalog, the occasions, the site
//! settings, the media library and the signed-in identity's cart and wishlist.
//! Everything it persists goes through one of four pluggable backends:
//!
//! - [`SnapshotCache`]: a string-keyed local cache for the catalog, occasion and
//!   settings snapshots.
//! - [`MediaStore`]: a capacity-tolerant local store for inline-encoded media.
//! - [`SelectionRecords`]: one remote document per identity holding cart and wishlist.
//! - [`ContentService`]: an optional bulk endpoint used for owner-triggered publish/fetch.
//!
//! ## Core Components
//! - [`engine`]: the Store Controller and its ordered background writers.
//! - [`cache`]: snapshot codec plus file and in-memory local backends.
//! - [`records`]: the per-identity document store, its TCP daemon and client.
//! - [`content`]: the HTTP bulk content service client.
//! - [`identity`]: identities, roles and the identity hub the controller follows.

pub mod cache;
pub mod config;
pub mod content;
pub mod defaults;
pub mod discovery;
pub mod engine;
pub mod identity;
pub mod migrate;
pub mod model;
pub mod records;

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{MediaEvent, PushAck, RemoteSnapshot, SyncEnvelope};
use crate::model::{MediaAsset, SelectionRecord};

/// Errors returned by Trunk Store.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested document does not exist.
    #[error("document not found")]
    DocumentNotFound,
    /// No bulk sync endpoint is configured in settings or configuration.
    #[error("bulk sync endpoint not configured")]
    NoEndpoint,
    /// The controller was opened without the backend this operation needs.
    #[error("service unavailable")]
    ServiceUnavailable,
    /// A remote operation did not finish within the configured timeout.
    #[error("remote operation timed out")]
    Timeout,
    /// A collection or document id outside `[A-Za-z0-9_-]`.
    #[error("invalid identifier")]
    InvalidIdentifier,
    /// The remote side answered with an error.
    #[error("remote error: {0}")]
    Remote(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during persistence or network communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// HTTP transport error talking to the bulk content service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized Result type for Trunk Store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// String-keyed local storage for the global snapshots.
///
/// Implementations are synchronous; the controller always calls them from a
/// blocking task, never from the mutation path.
pub trait SnapshotCache: Send + Sync {
    /// Returns the stored text for `key`, or `None` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Overwrites the text stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Local storage for media assets, kept apart from [`SnapshotCache`] because
/// encoded image payloads grow well past what a snapshot key should hold.
pub trait MediaStore: Send + Sync {
    /// Loads every stored asset, newest upload first.
    fn load_all(&self) -> Result<Vec<MediaAsset>>;
    /// Inserts or replaces one asset.
    fn put(&self, asset: &MediaAsset) -> Result<()>;
    /// Deletes one asset by id. Deleting a missing id is not an error.
    fn delete(&self, id: &str) -> Result<()>;
    /// Drops every stored asset.
    fn clear(&self) -> Result<()>;
}

/// The per-identity remote record holding cart and wishlist.
#[async_trait]
pub trait SelectionRecords: Send + Sync {
    /// Reads the record for `uid`. A missing record is `Ok(None)`.
    async fn fetch(&self, uid: &str) -> Result<Option<SelectionRecord>>;
    /// Merges the present fields of `record` into the record for `uid`,
    /// leaving every other field of that record untouched.
    async fn merge(&self, uid: &str, record: &SelectionRecord) -> Result<()>;
    /// Waits until accepted merges are durable. Most backends are durable on return.
    async fn flush(&self) {}
}

/// The bulk remote content service used for publish/fetch.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Sends the full snapshot to `endpoint`.
    async fn push(&self, endpoint: &str, envelope: &SyncEnvelope) -> Result<PushAck>;
    /// Requests the full snapshot from `endpoint`.
    async fn pull(&self, endpoint: &str) -> Result<RemoteSnapshot>;
    /// Best-effort forward of a single media upload.
    async fn notify_media(&self, endpoint: &str, event: &MediaEvent) -> Result<()>;
}
