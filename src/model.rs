use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sellable hamper.
///
/// Field names on the wire follow the storefront's JSON (`showOnHome`,
/// `showOnHampers`, `isSuggested`) so snapshots stay readable by the site.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    /// Listed on the primary (home) page.
    #[serde(default)]
    pub show_on_home: bool,
    /// Listed on the full catalog page.
    #[serde(default, rename = "showOnHampers")]
    pub show_on_catalog: bool,
    /// Highlighted as a suggestion.
    #[serde(default, rename = "isSuggested")]
    pub is_highlighted: bool,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price: price.into(),
            discount_price: None,
            image: String::new(),
            category: String::new(),
            show_on_home: false,
            show_on_catalog: true,
            is_highlighted: false,
        }
    }

    /// The price a customer pays: the discounted price when one is set.
    pub fn effective_price(&self) -> &str {
        match self.discount_price.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => &self.price,
        }
    }
}

/// A merchandising occasion ("Eid Celebrations", "Corporate Gifting", ...).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContentCategory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: String,
}

/// A physical shop shown on the contact page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShopLocation {
    pub id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

/// Site-wide editable content. Exactly one instance exists.
///
/// Every field falls back to the built-in default when it is absent from a
/// stored snapshot, so older snapshots keep loading after fields are added.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteContent {
    pub phone_number: String,
    pub whatsapp_number: String,
    pub owner_email: String,
    pub proprietor_name: String,
    pub instagram_url: String,
    pub facebook_url: String,
    pub twitter_url: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub hero_image: String,
    pub home_feature_image: String,
    pub about_title: String,
    pub about_text1: String,
    pub about_text2: String,
    pub about_quote: String,
    pub shops: Vec<ShopLocation>,
    /// Bulk content service endpoint.
    #[serde(rename = "gasEndpoint", skip_serializing_if = "Option::is_none")]
    pub sync_endpoint: Option<String>,
}

impl Default for SiteContent {
    fn default() -> Self {
        crate::defaults::settings()
    }
}

/// Coarse usage tag of an uploaded image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Hero,
    About,
    Gallery,
    Hamper,
    Occasion,
}

impl std::str::FromStr for MediaKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hero" => Ok(MediaKind::Hero),
            "about" => Ok(MediaKind::About),
            "gallery" => Ok(MediaKind::Gallery),
            "hamper" => Ok(MediaKind::Hamper),
            "occasion" => Ok(MediaKind::Occasion),
            other => Err(crate::Error::Internal(format!("unknown media kind: {}", other))),
        }
    }
}

/// An uploaded image kept inline as an encoded payload (usually a data URL).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    /// The encoded payload.
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub uploaded_at: DateTime<Utc>,
}

/// Orders a media library newest first, ties broken by id. Every media store
/// and the controller keep this order so a restart shows the same library.
pub fn sort_media(assets: &mut [MediaAsset]) {
    assets.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then_with(|| a.id.cmp(&b.id)));
}

/// The fields of a per-identity record owned by the store.
///
/// Absent fields mean "empty" on read and "leave alone" on merge.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SelectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wishlist: Option<Vec<String>>,
}

/// In-memory cart and wishlist of the active identity. Order of first insertion
/// is kept so listings and persisted records are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selections {
    pub cart: Vec<String>,
    pub wishlist: Vec<String>,
}

impl Selections {
    pub fn from_record(record: SelectionRecord) -> Self {
        Self {
            cart: record.cart.unwrap_or_default(),
            wishlist: record.wishlist.unwrap_or_default(),
        }
    }

    pub fn to_record(&self) -> SelectionRecord {
        SelectionRecord {
            cart: Some(self.cart.clone()),
            wishlist: Some(self.wishlist.clone()),
        }
    }

    pub fn clear(&mut self) {
        self.cart.clear();
        self.wishlist.clear();
    }
}

/// Flips `id` in `set`. Returns whether `id` is a member afterwards.
pub(crate) fn toggle_membership(set: &mut Vec<String>, id: &str) -> bool {
    if let Some(pos) = set.iter().position(|i| i == id) {
        set.remove(pos);
        false
    } else {
        set.push(id.to_string());
        true
    }
}
