use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single card printing, keyed by its feed id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub oracle_id: Option<String>,
    pub name: String,
    pub set_code: String,
    pub collector_number: String,
    pub lang: String,
    pub rarity: Option<String>,
    pub type_line: Option<String>,
    pub mana_cost: Option<String>,
    pub released_at: Option<String>,
    pub image_uri: Option<String>,
    pub price_usd: Option<String>,
}

/// A card set, keyed by its short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    pub code: String,
    pub name: String,
    pub set_type: Option<String>,
    pub released_at: Option<String>,
    pub card_count: i64,
    pub icon_svg_uri: Option<String>,
}

/// A stored card together with its local-only columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCard {
    pub record: CardRecord,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSet {
    pub record: SetRecord,
    pub icon_path: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
