use super::engine::{BatchApplied, DatasetAdapter};
use super::DatasetKind;
use crate::catalog_store::{CardRecord, CatalogStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct RawCard {
    id: String,
    oracle_id: Option<String>,
    name: String,
    set: String,
    collector_number: String,
    #[serde(default = "default_lang")]
    lang: String,
    rarity: Option<String>,
    type_line: Option<String>,
    mana_cost: Option<String>,
    released_at: Option<String>,
    image_uris: Option<ImageUris>,
    #[serde(default)]
    card_faces: Vec<RawCardFace>,
    prices: Option<Prices>,
}

#[derive(Debug, Deserialize)]
struct ImageUris {
    normal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCardFace {
    mana_cost: Option<String>,
    image_uris: Option<ImageUris>,
}

#[derive(Debug, Deserialize)]
struct Prices {
    usd: Option<String>,
}

fn default_lang() -> String {
    "en".to_string()
}

impl TryFrom<RawCard> for CardRecord {
    type Error = String;

    fn try_from(raw: RawCard) -> Result<Self, String> {
        if raw.id.trim().is_empty() {
            return Err("card has an empty id".to_string());
        }
        if raw.name.trim().is_empty() {
            return Err(format!("card {} has an empty name", raw.id));
        }

        // double-faced cards keep images and costs on their faces
        let first_face = raw.card_faces.first();
        let image_uri = raw
            .image_uris
            .and_then(|uris| uris.normal)
            .or_else(|| {
                first_face
                    .and_then(|face| face.image_uris.as_ref())
                    .and_then(|uris| uris.normal.clone())
            });
        let mana_cost = raw
            .mana_cost
            .or_else(|| first_face.and_then(|face| face.mana_cost.clone()));

        Ok(CardRecord {
            id: raw.id,
            oracle_id: raw.oracle_id,
            name: raw.name,
            set_code: raw.set,
            collector_number: raw.collector_number,
            lang: raw.lang,
            rarity: raw.rarity,
            type_line: raw.type_line,
            mana_cost,
            released_at: raw.released_at,
            image_uri,
            price_usd: raw.prices.and_then(|p| p.usd),
        })
    }
}

/// Mirrors the card feed into the `cards` table.
pub struct CardAdapter {
    store: Arc<dyn CatalogStore>,
}

impl CardAdapter {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DatasetAdapter for CardAdapter {
    type Record = CardRecord;

    fn kind(&self) -> DatasetKind {
        DatasetKind::Cards
    }

    fn convert(&self, raw: Value) -> Result<CardRecord, String> {
        let label = raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<no id>")
            .to_string();
        let card: RawCard =
            serde_json::from_value(raw).map_err(|e| format!("card {}: {}", label, e))?;
        CardRecord::try_from(card)
    }

    async fn apply_batch(
        &self,
        records: Vec<CardRecord>,
        _token: &CancellationToken,
    ) -> anyhow::Result<BatchApplied> {
        let applied = self.store.upsert_cards(&records)?;
        Ok(BatchApplied {
            applied,
            enrichment_failures: Vec::new(),
        })
    }

    fn local_count(&self) -> anyhow::Result<usize> {
        self.store.count_cards()
    }
}
