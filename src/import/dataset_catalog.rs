//! The small "catalog of datasets" document that points at the real feeds.

use super::ImportError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetCatalog {
    pub data: Vec<DatasetEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetEntry {
    #[serde(rename = "type")]
    pub dataset_type: String,
    pub download_uri: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl DatasetCatalog {
    pub fn find(&self, dataset_type: &str) -> Option<&DatasetEntry> {
        self.data.iter().find(|e| e.dataset_type == dataset_type)
    }
}

/// Fetches the catalog at `catalog_url` and picks the entry for `dataset_type`.
pub async fn resolve_dataset(
    client: &reqwest::Client,
    catalog_url: &str,
    dataset_type: &str,
    timeout: Duration,
) -> Result<DatasetEntry, ImportError> {
    let response = client
        .get(catalog_url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ImportError::Transport(format!("{}: {}", catalog_url, e)))?;

    if !response.status().is_success() {
        return Err(ImportError::HttpStatus {
            status: response.status().as_u16(),
            url: catalog_url.to_string(),
        });
    }

    let catalog: DatasetCatalog = response.json().await.map_err(|e| {
        if e.is_decode() {
            ImportError::Framing(format!("dataset catalog at {}: {}", catalog_url, e))
        } else {
            ImportError::Transport(format!("{}: {}", catalog_url, e))
        }
    })?;

    catalog
        .find(dataset_type)
        .cloned()
        .ok_or_else(|| ImportError::DatasetNotFound(dataset_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_entry_by_type() {
        let catalog: DatasetCatalog = serde_json::from_str(
            r#"{
                "object": "list",
                "data": [
                    {"type": "oracle_cards", "download_uri": "https://a.test/oracle.json"},
                    {"type": "default_cards", "download_uri": "https://a.test/default.json",
                     "updated_at": "2024-05-01T09:00:00Z", "size": 123}
                ]
            }"#,
        )
        .unwrap();

        let entry = catalog.find("default_cards").unwrap();
        assert_eq!(entry.download_uri, "https://a.test/default.json");
        assert_eq!(entry.size, Some(123));
        assert!(catalog.find("sets").is_none());
    }
}
