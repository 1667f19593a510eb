use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::{CardRecord, CatalogStore, SetRecord, StoredCard, StoredSet};
use crate::sqlite_persistence::{format_timestamp, open_versioned, parse_timestamp};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("catalog database lock poisoned"))
    }

    fn count(&self, table: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("Failed to count {}", table))?;
        Ok(count as usize)
    }

    fn row_to_card(row: &rusqlite::Row) -> rusqlite::Result<StoredCard> {
        let first_seen_at: String = row.get("first_seen_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(StoredCard {
            record: CardRecord {
                id: row.get("id")?,
                oracle_id: row.get("oracle_id")?,
                name: row.get("name")?,
                set_code: row.get("set_code")?,
                collector_number: row.get("collector_number")?,
                lang: row.get("lang")?,
                rarity: row.get("rarity")?,
                type_line: row.get("type_line")?,
                mana_cost: row.get("mana_cost")?,
                released_at: row.get("released_at")?,
                image_uri: row.get("image_uri")?,
                price_usd: row.get("price_usd")?,
            },
            first_seen_at: parse_timestamp(&first_seen_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
        })
    }

    fn row_to_set(row: &rusqlite::Row) -> rusqlite::Result<StoredSet> {
        let first_seen_at: String = row.get("first_seen_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(StoredSet {
            record: SetRecord {
                code: row.get("code")?,
                name: row.get("name")?,
                set_type: row.get("set_type")?,
                released_at: row.get("released_at")?,
                card_count: row.get("card_count")?,
                icon_svg_uri: row.get("icon_svg_uri")?,
            },
            icon_path: row.get("icon_path")?,
            first_seen_at: parse_timestamp(&first_seen_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
        })
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn upsert_cards(&self, cards: &[CardRecord]) -> Result<usize> {
        if cards.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cards (id, oracle_id, name, set_code, collector_number, lang,
                    rarity, type_line, mana_cost, released_at, image_uri, price_usd,
                    first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                    oracle_id = excluded.oracle_id,
                    name = excluded.name,
                    set_code = excluded.set_code,
                    collector_number = excluded.collector_number,
                    lang = excluded.lang,
                    rarity = excluded.rarity,
                    type_line = excluded.type_line,
                    mana_cost = excluded.mana_cost,
                    released_at = excluded.released_at,
                    image_uri = excluded.image_uri,
                    price_usd = excluded.price_usd,
                    updated_at = excluded.updated_at",
            )?;
            for card in cards {
                written += stmt
                    .execute(params![
                        card.id,
                        card.oracle_id,
                        card.name,
                        card.set_code,
                        card.collector_number,
                        card.lang,
                        card.rarity,
                        card.type_line,
                        card.mana_cost,
                        card.released_at,
                        card.image_uri,
                        card.price_usd,
                        now
                    ])
                    .with_context(|| format!("Failed to upsert card {}", card.id))?;
            }
        }
        tx.commit().context("Failed to commit card batch")?;
        Ok(written)
    }

    fn upsert_sets(&self, sets: &[SetRecord]) -> Result<usize> {
        if sets.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sets (code, name, set_type, released_at, card_count, icon_svg_uri,
                    first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(code) DO UPDATE SET
                    name = excluded.name,
                    set_type = excluded.set_type,
                    released_at = excluded.released_at,
                    card_count = excluded.card_count,
                    icon_svg_uri = excluded.icon_svg_uri,
                    updated_at = excluded.updated_at",
            )?;
            for set in sets {
                written += stmt
                    .execute(params![
                        set.code,
                        set.name,
                        set.set_type,
                        set.released_at,
                        set.card_count,
                        set.icon_svg_uri,
                        now
                    ])
                    .with_context(|| format!("Failed to upsert set {}", set.code))?;
            }
        }
        tx.commit().context("Failed to commit set batch")?;
        Ok(written)
    }

    fn count_cards(&self) -> Result<usize> {
        self.count("cards")
    }

    fn count_sets(&self) -> Result<usize> {
        self.count("sets")
    }

    fn get_card(&self, id: &str) -> Result<Option<StoredCard>> {
        let conn = self.conn()?;
        let card = conn
            .query_row(
                "SELECT * FROM cards WHERE id = ?1",
                params![id],
                Self::row_to_card,
            )
            .optional()
            .with_context(|| format!("Failed to load card {}", id))?;
        Ok(card)
    }

    fn get_set(&self, code: &str) -> Result<Option<StoredSet>> {
        let conn = self.conn()?;
        let set = conn
            .query_row(
                "SELECT * FROM sets WHERE code = ?1",
                params![code],
                Self::row_to_set,
            )
            .optional()
            .with_context(|| format!("Failed to load set {}", code))?;
        Ok(set)
    }

    fn set_icon_path(&self, code: &str, path: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sets SET icon_path = ?1 WHERE code = ?2",
            params![path, code],
        )
        .with_context(|| format!("Failed to record icon path for set {}", code))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteCatalogStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap();
        (store, temp_dir)
    }

    fn card(id: &str, name: &str) -> CardRecord {
        CardRecord {
            id: id.to_string(),
            oracle_id: Some(format!("oracle-{}", id)),
            name: name.to_string(),
            set_code: "lea".to_string(),
            collector_number: "1".to_string(),
            lang: "en".to_string(),
            rarity: Some("rare".to_string()),
            type_line: None,
            mana_cost: None,
            released_at: Some("1993-08-05".to_string()),
            image_uri: None,
            price_usd: Some("1.00".to_string()),
        }
    }

    fn set(code: &str, card_count: i64) -> SetRecord {
        SetRecord {
            code: code.to_string(),
            name: format!("Set {}", code),
            set_type: Some("core".to_string()),
            released_at: None,
            card_count,
            icon_svg_uri: Some(format!("https://icons.test/{}.svg", code)),
        }
    }

    #[test]
    fn test_upsert_cards_is_idempotent() {
        let (store, _dir) = create_test_store();
        let batch = vec![card("a", "Alpha"), card("b", "Beta"), card("c", "Gamma")];

        assert_eq!(store.upsert_cards(&batch).unwrap(), 3);
        assert_eq!(store.upsert_cards(&batch).unwrap(), 3);
        assert_eq!(store.count_cards().unwrap(), 3);
    }

    #[test]
    fn test_upsert_cards_updates_feed_columns_only() {
        let (store, _dir) = create_test_store();
        store.upsert_cards(&[card("a", "Alpha")]).unwrap();
        let first = store.get_card("a").unwrap().unwrap();

        let mut changed = card("a", "Alpha Prime");
        changed.price_usd = None;
        store.upsert_cards(&[changed.clone()]).unwrap();

        let stored = store.get_card("a").unwrap().unwrap();
        assert_eq!(stored.record, changed);
        assert_eq!(stored.first_seen_at, first.first_seen_at);
        assert!(stored.updated_at >= first.updated_at);
    }

    #[test]
    fn test_upsert_sets_preserves_icon_path() {
        let (store, _dir) = create_test_store();
        store.upsert_sets(&[set("lea", 295)]).unwrap();
        store.set_icon_path("lea", "/assets/sets/lea.svg").unwrap();

        store.upsert_sets(&[set("lea", 302), set("leb", 302)]).unwrap();

        let lea = store.get_set("lea").unwrap().unwrap();
        assert_eq!(lea.record.card_count, 302);
        assert_eq!(lea.icon_path.as_deref(), Some("/assets/sets/lea.svg"));
        assert!(store.get_set("leb").unwrap().unwrap().icon_path.is_none());
        assert_eq!(store.count_sets().unwrap(), 2);
    }

    #[test]
    fn test_missing_rows() {
        let (store, _dir) = create_test_store();
        assert!(store.get_card("nope").unwrap().is_none());
        assert!(store.get_set("nope").unwrap().is_none());
        assert_eq!(store.upsert_cards(&[]).unwrap(), 0);
        assert_eq!(store.count_cards().unwrap(), 0);
    }
}
