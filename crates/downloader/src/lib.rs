//! HTTP downloader for preview assets.

use std::path::Path;

use anyhow::Context as _;
use mushaf_application::Downloader;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request {url}"))?
            .error_for_status()
            .with_context(|| format!("fetch {url}"))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;

        write_atomically(destination, &bytes)
            .await
            .with_context(|| format!("write {}", destination.display()))?;
        debug!(url, destination = %destination.display(), bytes = bytes.len(), "downloaded");
        Ok(())
    }
}

// Publish via temp file + rename so a concurrent reader never sees a
// partially written asset.
async fn write_atomically(destination: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create dir {}", parent.display()))?;
    }

    let mut tmp = destination.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = Path::new(&tmp);

    tokio::fs::write(tmp, bytes).await?;
    tokio::fs::rename(tmp, destination).await?;
    Ok(())
}
