//! Persistence collaborator: where enabled targets come from and where
//! finished scans are written.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::types::{ScanSummary, UrlRecord, UrlState};

#[async_trait]
pub trait UrlStore: Send + Sync {
    /// URLs of every target currently marked enabled, in stored order.
    async fn enabled_urls(&self) -> Result<Vec<String>>;
    /// Persist one finished scan.
    async fn record_scan(&self, summary: ScanSummary) -> Result<()>;
    /// Previously persisted scans, most recent first.
    async fn history(&self) -> Result<Vec<ScanSummary>>;
}

/// In-process store, used for one-shot CLI runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    urls: Vec<UrlRecord>,
    history: Mutex<Vec<ScanSummary>>,
}

impl MemoryStore {
    pub fn new(urls: Vec<UrlRecord>) -> Self {
        Self {
            urls,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor: every URL enabled.
    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = urls
            .into_iter()
            .enumerate()
            .map(|(idx, url)| {
                let url = url.into();
                UrlRecord {
                    id: (idx + 1).to_string(),
                    name: url.clone(),
                    url,
                    status: UrlState::Enabled,
                    added_at: None,
                }
            })
            .collect();
        Self::new(records)
    }
}

#[async_trait]
impl UrlStore for MemoryStore {
    async fn enabled_urls(&self) -> Result<Vec<String>> {
        Ok(enabled(&self.urls))
    }

    async fn record_scan(&self, summary: ScanSummary) -> Result<()> {
        self.history.lock().await.push(summary);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ScanSummary>> {
        let history = self.history.lock().await;
        Ok(history.iter().rev().cloned().collect())
    }
}

/// Flat JSON files: an array of [`UrlRecord`] and an append-only array of [`ScanSummary`].
///
/// Missing files read as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    urls_path: PathBuf,
    history_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(urls_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            urls_path: urls_path.into(),
            history_path: history_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn urls_path(&self) -> &Path {
        &self.urls_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }
}

#[async_trait]
impl UrlStore for JsonFileStore {
    async fn enabled_urls(&self) -> Result<Vec<String>> {
        let records: Vec<UrlRecord> = read_json_array(&self.urls_path).await?;
        Ok(enabled(&records))
    }

    async fn record_scan(&self, summary: ScanSummary) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut history: Vec<ScanSummary> = read_json_array(&self.history_path).await?;
        history.push(summary);
        let body = serde_json::to_vec_pretty(&history)?;

        // Write next to the target and rename so readers never see a partial file.
        let tmp = self.history_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write scan history: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.history_path)
            .await
            .with_context(|| {
                format!("failed to replace scan history: {}", self.history_path.display())
            })?;
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ScanSummary>> {
        let mut history: Vec<ScanSummary> = read_json_array(&self.history_path).await?;
        history.reverse();
        Ok(history)
    }
}

fn enabled(records: &[UrlRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.status == UrlState::Enabled)
        .map(|r| r.url.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Parse a plain-text target list.
///
/// One URL per line; blank lines and lines starting with `#` are ignored, as is
/// anything after ` #` on a line. Order and duplicates are preserved.
pub fn parse_targets_str(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split(" #").next().unwrap_or("").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Load a target list from a file path.
pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read targets file: {}", path.as_ref().display()))?;
    Ok(parse_targets_str(&content))
}
