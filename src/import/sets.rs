use super::asset_downloader::AssetDownloader;
use super::engine::{BatchApplied, DatasetAdapter};
use super::DatasetKind;
use crate::catalog_store::{CatalogStore, SetRecord};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawSet {
    code: String,
    name: String,
    set_type: Option<String>,
    released_at: Option<String>,
    #[serde(default)]
    card_count: i64,
    icon_svg_uri: Option<String>,
}

impl TryFrom<RawSet> for SetRecord {
    type Error = String;

    fn try_from(raw: RawSet) -> Result<Self, String> {
        if !is_safe_code(&raw.code) {
            return Err(format!("set has an unusable code '{}'", raw.code));
        }
        Ok(SetRecord {
            code: raw.code,
            name: raw.name,
            set_type: raw.set_type,
            released_at: raw.released_at,
            card_count: raw.card_count,
            icon_svg_uri: raw.icon_svg_uri.filter(|uri| !uri.is_empty()),
        })
    }
}

/// Set codes end up in file names.
fn is_safe_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Mirrors the set feed into the `sets` table and keeps a local copy of
/// each set's icon under `<assets_dir>/sets/<code>.svg`.
pub struct SetAdapter {
    store: Arc<dyn CatalogStore>,
    downloader: AssetDownloader,
    assets_dir: PathBuf,
}

impl SetAdapter {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        downloader: AssetDownloader,
        assets_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            downloader,
            assets_dir,
        }
    }

    pub fn icon_path(&self, code: &str) -> PathBuf {
        self.assets_dir.join("sets").join(format!("{}.svg", code))
    }

    /// Makes sure the icon exists locally and is recorded on the row.
    async fn ensure_icon(&self, set: &SetRecord) -> Result<(), String> {
        let Some(uri) = set.icon_svg_uri.as_deref() else {
            return Ok(());
        };
        let path = self.icon_path(&set.code);

        if !file_exists(&path).await {
            let bytes = self
                .downloader
                .download(uri, &path)
                .await
                .map_err(|e| format!("set {}: icon download failed: {:#}", set.code, e))?;
            debug!("Downloaded icon for set {} ({} bytes)", set.code, bytes);
        }

        let path_str = path.to_string_lossy();
        let recorded = self
            .store
            .get_set(&set.code)
            .map_err(|e| format!("set {}: {:#}", set.code, e))?
            .and_then(|stored| stored.icon_path);
        if recorded.as_deref() != Some(path_str.as_ref()) {
            self.store
                .set_icon_path(&set.code, &path_str)
                .map_err(|e| format!("set {}: {:#}", set.code, e))?;
        }
        Ok(())
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl DatasetAdapter for SetAdapter {
    type Record = SetRecord;

    fn kind(&self) -> DatasetKind {
        DatasetKind::Sets
    }

    fn convert(&self, raw: Value) -> Result<SetRecord, String> {
        let label = raw
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("<no code>")
            .to_string();
        let set: RawSet =
            serde_json::from_value(raw).map_err(|e| format!("set {}: {}", label, e))?;
        SetRecord::try_from(set)
    }

    async fn apply_batch(
        &self,
        records: Vec<SetRecord>,
        token: &CancellationToken,
    ) -> anyhow::Result<BatchApplied> {
        let applied = self.store.upsert_sets(&records)?;

        let mut enrichment_failures = Vec::new();
        for set in &records {
            if token.is_cancelled() {
                break;
            }
            if let Err(message) = self.ensure_icon(set).await {
                enrichment_failures.push(message);
            }
        }

        Ok(BatchApplied {
            applied,
            enrichment_failures,
        })
    }

    fn local_count(&self) -> anyhow::Result<usize> {
        self.store.count_sets()
    }
}
