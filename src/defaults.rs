//! Built-in content adopted when the local cache has nothing for a snapshot.

use crate::model::{CatalogItem, ContentCategory, ShopLocation, SiteContent};

fn hamper(
    id: &str,
    name: &str,
    description: &str,
    price: &str,
    image: &str,
    category: &str,
    flags: (bool, bool, bool),
) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price: price.to_string(),
        discount_price: None,
        image: image.to_string(),
        category: category.to_string(),
        show_on_home: flags.0,
        show_on_catalog: flags.1,
        is_highlighted: flags.2,
    }
}

pub fn catalog() -> Vec<CatalogItem> {
    vec![
        hamper(
            "hamp-1",
            "Royal Saffron Trunk",
            "Premium Kashmiri Saffron, Mamra Almonds and Snow-White Walnuts in a handcrafted walnut wood trunk.",
            "3500",
            "https://i.pinimg.com/736x/3c/6f/f9/3c6ff99812348abb108cb9a93d2c9f66.jpg",
            "Wedding",
            (true, true, true),
        ),
        hamper(
            "hamp-2",
            "Valley's Embrace",
            "Sun-dried Apricots, Figs and organic Kashmiri Honey.",
            "1800",
            "https://i.pinimg.com/736x/d5/08/98/d50898655c58f234e38bfdd284f86184.jpg",
            "Gifting",
            (true, true, true),
        ),
        hamper(
            "hamp-3",
            "Shikara Delight",
            "Dates, Cashews and the signature Kahwa spice mix.",
            "2200",
            "https://i.pinimg.com/736x/8b/c5/89/8bc589b14ca4495dc3e800b718828211.jpg",
            "Festive",
            (true, true, false),
        ),
        hamper(
            "hamp-4",
            "Pahalgam Picnic",
            "Trail mix, dried berries and almond kernels.",
            "1200",
            "https://images.unsplash.com/photo-1516054575922-f0b8eeadec1a?q=80&w=1374&auto=format&fit=crop",
            "Corporate",
            (false, true, false),
        ),
        hamper(
            "hamp-11",
            "Saffron (Kesari)",
            "Pure Kashmiri strands. 1g pack.",
            "450",
            "https://images.unsplash.com/photo-1595166687023-34538947ddc8?q=80&w=1471&auto=format&fit=crop",
            "Dry Fruits",
            (false, true, true),
        ),
        hamper(
            "hamp-13",
            "Royal Diwali Delight",
            "Almonds, cashews, Ajwa dates, raisins, walnuts.",
            "1200",
            "https://i.pinimg.com/736x/9f/f2/3b/9ff23b390fc813da5c5a9e6191acdc33.jpg",
            "Festive",
            (true, true, true),
        ),
        hamper(
            "hamp-14",
            "Eid Special",
            "Ajwa and Kalmi dates, saffron, anjeer, kimia raisins.",
            "1500",
            "/images/eid_special.jpg",
            "Festive",
            (true, true, true),
        ),
        hamper(
            "hamp-17",
            "Custom Hamper",
            "Mix your favorites (min. 500g).",
            "800",
            "/images/custom-hamper.png",
            "Gifting",
            (false, true, false),
        ),
    ]
}

pub fn occasions() -> Vec<ContentCategory> {
    [
        ("occ-1", "Nikkah & Weddings", "https://i.pinimg.com/736x/58/ea/f8/58eaf86647247159eade109d171882a0.jpg"),
        ("occ-2", "Eid Celebrations", "https://i.pinimg.com/1200x/7c/1f/e5/7c1fe57da9748fa573e65a722946921c.jpg"),
        ("occ-3", "Corporate Gifting", "https://i.pinimg.com/736x/38/01/e0/3801e0205dc217c2f56452b76ab47f73.jpg"),
        ("occ-4", "Baby Announcement", "https://i.pinimg.com/736x/b6/c0/80/b6c080db18f09fb72f2fcb219d58a2b7.jpg"),
        ("occ-5", "House Warming", "https://i.pinimg.com/1200x/01/89/b8/0189b8f4a8e44005cc920da579acb90a.jpg"),
        ("occ-6", "Personal Gestures", "https://i.pinimg.com/736x/52/2b/4e/522b4ed410f5881da1ecd7e69e8e278d.jpg"),
    ]
    .into_iter()
    .map(|(id, title, image)| ContentCategory {
        id: id.to_string(),
        title: title.to_string(),
        image: image.to_string(),
    })
    .collect()
}

pub fn settings() -> SiteContent {
    SiteContent {
        phone_number: "+91 88990 43549".to_string(),
        whatsapp_number: "8899043549".to_string(),
        owner_email: "theblessingstrunk@gmail.com".to_string(),
        proprietor_name: "Azhar Majeed".to_string(),
        instagram_url: "#".to_string(),
        facebook_url: "#".to_string(),
        twitter_url: "#".to_string(),
        hero_title: "The Blessings Trunk".to_string(),
        hero_subtitle: "A trunk full of love, warmth & heartfelt wishes".to_string(),
        hero_image: "https://i.pinimg.com/736x/71/ae/65/71ae65fb2265bfdde8e423a87be501df.jpg".to_string(),
        home_feature_image: "https://i.pinimg.com/736x/47/01/77/470177b9b31fe2b0f2a4b12dc7912f6d.jpg".to_string(),
        about_title: "Gifting with Emotion".to_string(),
        about_text1: "The Blessings Trunk facilitates blessings through premium handcrafted Kashmiri dry fruit hampers."
            .to_string(),
        about_text2: "Every thread of saffron is sourced with reverence for our heritage.".to_string(),
        about_quote: "Facilitating blessings, one trunk at a time.".to_string(),
        shops: vec![ShopLocation {
            id: "shop-1".to_string(),
            name: "Srinagar Flagship".to_string(),
            address: "NST Complex, 1st Floor, Residency Road, Srinagar, J&K".to_string(),
            lat: 34.0754,
            lng: 74.8142,
        }],
        sync_endpoint: None,
    }
}
