//! Bulk remote content service: envelopes and the HTTP client.
//!
//! Publishing posts `{"action": "syncAll", "data": {...}}` to the endpoint;
//! fetching issues `GET <endpoint>?action=getData` and expects the same `data`
//! shape back, with every collection optional. Single uploads are forwarded as
//! `{"action": "upload", "data": {"filename", "mimeType", "base64"}}`.
pub mod http;

pub use http::HttpContentService;

use serde::{Deserialize, Serialize};

use crate::model::{CatalogItem, ContentCategory, MediaAsset, SiteContent};

pub const ACTION_SYNC_ALL: &str = "syncAll";
pub const ACTION_GET_DATA: &str = "getData";
pub const ACTION_UPLOAD: &str = "upload";

/// The full content snapshot moved by publish/fetch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotData {
    pub hampers: Vec<CatalogItem>,
    pub occasions: Vec<ContentCategory>,
    pub settings: SiteContent,
    pub media: Vec<MediaAsset>,
}

/// The request body of a publish.
#[derive(Serialize, Debug, Clone)]
pub struct SyncEnvelope {
    pub action: &'static str,
    pub data: SnapshotData,
}

impl SyncEnvelope {
    pub fn sync_all(data: SnapshotData) -> Self {
        Self { action: ACTION_SYNC_ALL, data }
    }
}

/// What a pull returned. Collections the service did not send stay `None`
/// and are left untouched by the controller.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub hampers: Option<Vec<CatalogItem>>,
    #[serde(default)]
    pub occasions: Option<Vec<ContentCategory>>,
    #[serde(default)]
    pub settings: Option<SiteContent>,
    #[serde(default)]
    pub media: Option<Vec<MediaAsset>>,
}

/// How far a push is known to have got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAck {
    /// The service answered with a success status.
    Confirmed,
    /// The request went out but the answer cannot be read as success or failure.
    Opaque,
}

/// An uploaded image in the shape the bulk service stores files in.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpload {
    pub filename: String,
    pub mime_type: String,
    /// The payload without its `data:` prefix.
    pub base64: String,
}

impl MediaUpload {
    /// Splits an asset's data URL into mime type and payload. `None` when the
    /// asset is not an inline base64 data URL.
    pub fn from_asset(asset: &MediaAsset) -> Option<Self> {
        let rest = asset.url.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        Some(Self {
            filename: asset.name.clone(),
            mime_type: mime_type.to_string(),
            base64: payload.to_string(),
        })
    }
}

/// Media library change forwarded to the service.
///
/// Only uploads are forwarded; removals stay local.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", content = "data")]
pub enum MediaEvent {
    #[serde(rename = "upload")]
    Upload(MediaUpload),
}
