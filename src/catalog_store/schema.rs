//! SQLite schema for the local card catalog.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const CARDS_TABLE_V1: Table = Table {
    name: "cards",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("oracle_id", &SqlType::Text),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("set_code", &SqlType::Text, non_null = true),
        sqlite_column!("collector_number", &SqlType::Text, non_null = true),
        sqlite_column!("lang", &SqlType::Text, non_null = true),
        sqlite_column!("rarity", &SqlType::Text),
        sqlite_column!("type_line", &SqlType::Text),
        sqlite_column!("mana_cost", &SqlType::Text),
        sqlite_column!("released_at", &SqlType::Text),
        sqlite_column!("image_uri", &SqlType::Text),
        sqlite_column!("price_usd", &SqlType::Text),
        sqlite_column!("first_seen_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_cards_name", "name"),
        ("idx_cards_set_number", "set_code, collector_number"),
    ],
};

const SETS_TABLE_V1: Table = Table {
    name: "sets",
    columns: &[
        sqlite_column!("code", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("set_type", &SqlType::Text),
        sqlite_column!("released_at", &SqlType::Text),
        sqlite_column!(
            "card_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("icon_svg_uri", &SqlType::Text),
        sqlite_column!("icon_path", &SqlType::Text),
        sqlite_column!("first_seen_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[CARDS_TABLE_V1, SETS_TABLE_V1],
    migration: None,
}];
