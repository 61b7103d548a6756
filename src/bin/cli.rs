use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use trunk_store::config::StoreConfig;
use trunk_store::discovery;
use trunk_store::engine::PublishOutcome;
use trunk_store::identity::Identity;
use trunk_store::model::{CatalogItem, ContentCategory, MediaAsset, MediaKind, SiteContent};

/// Owner console for a Trunk store.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Overrides TRUNK_DATA_DIR.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Lists catalog items.
    Catalog {
        #[arg(long)]
        home: bool,
        #[arg(long)]
        highlighted: bool,
    },
    AddItem {
        id: String,
        name: String,
        price: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        image: String,
        #[arg(long)]
        discount_price: Option<String>,
        #[arg(long)]
        home: bool,
        #[arg(long)]
        highlight: bool,
    },
    /// Changes the given fields of an existing catalog item.
    UpdateItem {
        id: String,
        #[command(flatten)]
        changes: ItemChanges,
    },
    RemoveItem { id: String },
    Occasions,
    AddOccasion {
        id: String,
        title: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    UpdateOccasion {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        image: Option<String>,
    },
    RemoveOccasion { id: String },
    Settings,
    /// Replaces the site settings with a JSON document ("-" reads stdin).
    /// Fields left out take their defaults.
    ReplaceSettings { file: PathBuf },
    /// Stores the bulk sync endpoint in settings.
    SetEndpoint { url: String },
    Publish,
    Fetch,
    Media,
    AddMedia {
        name: String,
        /// Encoded payload, usually a data URL.
        url: String,
        #[arg(long, default_value = "gallery")]
        kind: String,
    },
    RemoveMedia { id: String },
    /// Shows the cart and wishlist stored for an identity.
    Selections { uid: String },
}

#[derive(Args, Clone, Debug, Default, PartialEq)]
struct ItemChanges {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    image: Option<String>,
    /// An empty value clears the discount.
    #[arg(long)]
    discount_price: Option<String>,
    #[arg(long)]
    home: Option<bool>,
    #[arg(long)]
    catalog: Option<bool>,
    #[arg(long)]
    highlight: Option<bool>,
}

impl ItemChanges {
    fn apply(self, item: &mut CatalogItem) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(description) = self.description {
            item.description = description;
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(image) = self.image {
            item.image = image;
        }
        if let Some(discount) = self.discount_price {
            item.discount_price = Some(discount).filter(|d| !d.trim().is_empty());
        }
        if let Some(home) = self.home {
            item.show_on_home = home;
        }
        if let Some(catalog) = self.catalog {
            item.show_on_catalog = catalog;
        }
        if let Some(highlight) = self.highlight {
            item.is_highlighted = highlight;
        }
    }
}

fn parse_settings(json: &str) -> anyhow::Result<SiteContent> {
    serde_json::from_str(json).context("settings must be a JSON object")
}

fn read_settings(source: &Path) -> anyhow::Result<SiteContent> {
    let mut json = String::new();
    if source == Path::new("-") {
        std::io::stdin().read_to_string(&mut json)?;
    } else {
        json = std::fs::read_to_string(source).with_context(|| format!("reading {}", source.display()))?;
    }
    parse_settings(&json)
}

fn print_items(items: &[CatalogItem]) {
    for item in items {
        println!("{:<10} {:<32} {:>8}  {}", item.id, item.name, item.effective_price(), item.category);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let store = discovery::open(&config).await?;

    let mut failed = None;
    match cli.command {
        Commands::Catalog { home, highlighted } => {
            let items = match (home, highlighted) {
                (true, _) => store.home_listing(),
                (_, true) => store.highlighted(),
                _ => store.list_catalog(),
            };
            print_items(&items);
        }
        Commands::AddItem { id, name, price, description, category, image, discount_price, home, highlight } => {
            let item = CatalogItem {
                description,
                category,
                image,
                discount_price,
                show_on_home: home,
                is_highlighted: highlight,
                ..CatalogItem::new(id.clone(), name, price)
            };
            if store.add_catalog_item(item) {
                println!("OK");
            } else {
                failed = Some(format!("catalog item {} already exists", id));
            }
        }
        Commands::UpdateItem { id, changes } => match store.find_item(&id) {
            Some(mut item) => {
                changes.apply(&mut item);
                store.update_catalog_item(item);
                println!("OK");
            }
            None => failed = Some(format!("no catalog item {}", id)),
        },
        Commands::RemoveItem { id } => {
            if store.remove_catalog_item(&id) {
                println!("OK");
            } else {
                failed = Some(format!("no catalog item {}", id));
            }
        }
        Commands::Occasions => {
            for occasion in store.list_occasions() {
                println!("{:<10} {}", occasion.id, occasion.title);
            }
        }
        Commands::AddOccasion { id, title, image } => {
            if store.add_occasion(ContentCategory { id: id.clone(), title, image }) {
                println!("OK");
            } else {
                failed = Some(format!("occasion {} already exists", id));
            }
        }
        Commands::UpdateOccasion { id, title, image } => {
            match store.list_occasions().into_iter().find(|o| o.id == id) {
                Some(mut occasion) => {
                    if let Some(title) = title {
                        occasion.title = title;
                    }
                    if let Some(image) = image {
                        occasion.image = image;
                    }
                    store.update_occasion(occasion);
                    println!("OK");
                }
                None => failed = Some(format!("no occasion {}", id)),
            }
        }
        Commands::RemoveOccasion { id } => {
            if store.remove_occasion(&id) {
                println!("OK");
            } else {
                failed = Some(format!("no occasion {}", id));
            }
        }
        Commands::Settings => {
            println!("{}", serde_json::to_string_pretty(&store.settings())?);
        }
        Commands::ReplaceSettings { file } => match read_settings(&file) {
            Ok(settings) => {
                store.replace_settings(settings);
                println!("OK");
            }
            Err(e) => failed = Some(format!("{:#}", e)),
        },
        Commands::SetEndpoint { url } => {
            let mut settings = store.settings();
            settings.sync_endpoint = Some(url);
            store.replace_settings(settings);
            println!("OK");
        }
        Commands::Publish => match store.publish_to_remote().await {
            PublishOutcome::Confirmed => println!("Published."),
            PublishOutcome::Dispatched => println!("Sent. The service did not confirm receipt."),
            PublishOutcome::TimedOut => failed = Some("publish timed out; it may still have arrived".to_string()),
            PublishOutcome::Failed(e) => failed = Some(format!("publish failed: {}", e)),
        },
        Commands::Fetch => match store.fetch_from_remote().await {
            Ok(summary) => println!("{:?}", summary),
            Err(e) => failed = Some(format!("fetch failed: {}", e)),
        },
        Commands::Media => {
            for asset in store.media_library() {
                let kind = format!("{:?}", asset.kind);
                println!("{:<24} {:<10} {}  {}", asset.id, kind, asset.uploaded_at.to_rfc3339(), asset.name);
            }
        }
        Commands::AddMedia { name, url, kind } => {
            let kind: MediaKind = kind.parse()?;
            let uploaded_at = Utc::now();
            let id = format!("media-{}", uploaded_at.timestamp_millis());
            store.add_media_asset(MediaAsset { id: id.clone(), url, name, kind, uploaded_at });
            println!("{}", id);
        }
        Commands::RemoveMedia { id } => {
            if store.remove_media_asset(&id) {
                println!("OK");
            } else {
                failed = Some(format!("no media asset {}", id));
            }
        }
        Commands::Selections { uid } => {
            store.set_identity(Some(Identity::customer(uid))).await;
            println!("phase: {:?}", store.session_phase());
            println!("cart:");
            print_items(&store.cart_items());
            println!("wishlist:");
            print_items(&store.wishlist_items());
        }
    }

    store.close().await;
    if let Some(msg) = failed {
        bail!(msg);
    }
    Ok(())
}
