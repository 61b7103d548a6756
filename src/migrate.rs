//! Startup repairs for snapshots written by earlier deployments.
//!
//! There is no migration ledger: every migration is keyed by an entity id and a
//! predicate on the stored value, so running the whole list again is a no-op.

use log::info;

use crate::model::{CatalogItem, ContentCategory, SiteContent};

const PINIMG: &str = "pinimg.com";
const OLD_HERO: &str = "https://images.unsplash.com/photo-1606830733744-0ad778449672?q=80&w=2000&auto=format&fit=crop";
const OLD_FEATURE: &str = "https://images.unsplash.com/photo-1516054575922-f0b8eeadec1a?q=80&w=1374&auto=format&fit=crop";

/// Image fields of [`SiteContent`] a migration can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsImage {
    Hero,
    HomeFeature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Migration {
    /// Replace the image of catalog item `id` unless it already contains `marker`.
    CatalogImage { id: &'static str, marker: &'static str, replacement: &'static str },
    /// Replace the image of occasion `id` unless it already contains `marker`.
    OccasionImage { id: &'static str, marker: &'static str, replacement: &'static str },
    /// Replace a settings image only when it still equals `from`.
    SettingsImage { field: SettingsImage, from: &'static str, to: &'static str },
}

/// The migrations every controller applies at startup, in order.
pub fn registered() -> Vec<Migration> {
    let catalog = [
        ("hamp-1", "https://i.pinimg.com/736x/3c/6f/f9/3c6ff99812348abb108cb9a93d2c9f66.jpg"),
        ("hamp-2", "https://i.pinimg.com/736x/d5/08/98/d50898655c58f234e38bfdd284f86184.jpg"),
        ("hamp-13", "https://i.pinimg.com/736x/9f/f2/3b/9ff23b390fc813da5c5a9e6191acdc33.jpg"),
        ("hamp-3", "https://i.pinimg.com/736x/8b/c5/89/8bc589b14ca4495dc3e800b718828211.jpg"),
    ];
    let occasions = [
        ("occ-1", "https://i.pinimg.com/736x/58/ea/f8/58eaf86647247159eade109d171882a0.jpg"),
        ("occ-2", "https://i.pinimg.com/1200x/7c/1f/e5/7c1fe57da9748fa573e65a722946921c.jpg"),
        ("occ-3", "https://i.pinimg.com/736x/38/01/e0/3801e0205dc217c2f56452b76ab47f73.jpg"),
        ("occ-4", "https://i.pinimg.com/736x/b6/c0/80/b6c080db18f09fb72f2fcb219d58a2b7.jpg"),
        ("occ-5", "https://i.pinimg.com/1200x/01/89/b8/0189b8f4a8e44005cc920da579acb90a.jpg"),
        ("occ-6", "https://i.pinimg.com/736x/52/2b/4e/522b4ed410f5881da1ecd7e69e8e278d.jpg"),
    ];

    let mut out: Vec<Migration> = catalog
        .into_iter()
        .map(|(id, replacement)| Migration::CatalogImage { id, marker: PINIMG, replacement })
        .collect();
    out.extend(
        occasions
            .into_iter()
            .map(|(id, replacement)| Migration::OccasionImage { id, marker: PINIMG, replacement }),
    );
    out.push(Migration::SettingsImage {
        field: SettingsImage::HomeFeature,
        from: OLD_FEATURE,
        to: "https://i.pinimg.com/736x/47/01/77/470177b9b31fe2b0f2a4b12dc7912f6d.jpg",
    });
    out.push(Migration::SettingsImage {
        field: SettingsImage::Hero,
        from: OLD_HERO,
        to: "https://i.pinimg.com/736x/71/ae/65/71ae65fb2265bfdde8e423a87be501df.jpg",
    });
    out
}

/// The snapshots a migration run works on.
pub struct MigrationTarget<'a> {
    pub catalog: &'a mut [CatalogItem],
    pub occasions: &'a mut [ContentCategory],
    pub settings: &'a mut SiteContent,
}

impl Migration {
    /// Applies this migration. Returns whether anything changed.
    pub fn apply(&self, target: &mut MigrationTarget<'_>) -> bool {
        match self {
            Migration::CatalogImage { id, marker, replacement } => {
                match target.catalog.iter_mut().find(|h| h.id == *id) {
                    Some(item) if !item.image.contains(marker) => {
                        item.image = replacement.to_string();
                        true
                    }
                    _ => false,
                }
            }
            Migration::OccasionImage { id, marker, replacement } => {
                match target.occasions.iter_mut().find(|o| o.id == *id) {
                    Some(occ) if !occ.image.contains(marker) => {
                        occ.image = replacement.to_string();
                        true
                    }
                    _ => false,
                }
            }
            Migration::SettingsImage { field, from, to } => {
                let slot = match field {
                    SettingsImage::Hero => &mut target.settings.hero_image,
                    SettingsImage::HomeFeature => &mut target.settings.home_feature_image,
                };
                if slot.as_str() == *from {
                    *slot = to.to_string();
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Runs `migrations` in order and returns how many changed something.
pub fn apply_all(migrations: &[Migration], mut target: MigrationTarget<'_>) -> usize {
    let mut changed = 0;
    for m in migrations {
        if m.apply(&mut target) {
            info!("Applied migration {:?}", m);
            changed += 1;
        }
    }
    changed
}
