//! HTTP download of small static assets (set icons).

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Clone)]
pub struct AssetDownloader {
    client: reqwest::Client,
    timeout: Duration,
}

impl AssetDownloader {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Downloads `url` to `dest`, creating parent directories.
    ///
    /// The body is written to a sibling `.part` file first and renamed into
    /// place, so `dest` only ever holds a complete download.
    /// Returns the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Download of {} failed with status: {}", url, response.status());
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directories")?;
        }

        let partial = dest.with_extension("part");
        let mut file = File::create(&partial)
            .await
            .context("Failed to create destination file")?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?
        {
            file.write_all(&chunk)
                .await
                .context("Failed to write to file")?;
            written += chunk.len() as u64;
        }
        file.flush().await.context("Failed to flush file")?;
        drop(file);

        tokio::fs::rename(&partial, dest)
            .await
            .with_context(|| format!("Failed to move download into {:?}", dest))?;
        Ok(written)
    }
}
