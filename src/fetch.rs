// src/fetch.rs

use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt, time::Instant};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::FetchConfig;

const PROGRESS_EVERY: u64 = 256 * 1024 * 1024;

/// Sibling path the download is streamed into before the final rename.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream the dump at `cfg.url` to `cfg.dest`. Returns the number of bytes written.
///
/// The body goes to a `.part` file first, so an interrupted run never leaves
/// a truncated dump at `cfg.dest`.
#[instrument(level = "info", skip(client, cfg), fields(url = %cfg.url, dest = %cfg.dest.display()))]
pub async fn download_dataset(client: &Client, cfg: &FetchConfig) -> Result<u64> {
    let url = Url::parse(&cfg.url).with_context(|| format!("parsing dataset URL {}", cfg.url))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("unsupported URL scheme {:?}", url.scheme()));
    }

    if let Some(parent) = cfg.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let start = Instant::now();
    let response = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    debug!(length = ?response.content_length(), "response headers received");

    let part = partial_path(&cfg.dest);
    let mut file = fs::File::create(&part)
        .await
        .with_context(|| format!("creating {}", part.display()))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    let mut next_report = PROGRESS_EVERY;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("reading response body")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("writing {}", part.display()))?;
        written += chunk.len() as u64;
        if written >= next_report {
            info!(mb = written / (1024 * 1024), "downloading");
            next_report += PROGRESS_EVERY;
        }
    }
    file.flush().await?;
    drop(file);

    fs::rename(&part, &cfg.dest)
        .await
        .with_context(|| format!("moving {} into place", part.display()))?;
    info!(bytes = written, elapsed = ?start.elapsed(), "dataset downloaded");
    Ok(written)
}
