use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::extract::extract_text;
use crate::fetcher::{FetchError, FetchStrategy, Fetcher, PageSource, DEFAULT_TIMEOUT, POLITE_TIMEOUT};
use crate::matcher::{match_keywords, parse_keywords};
use crate::registry::{ScanHandle, ScanRegistry};
use crate::store::UrlStore;
use crate::types::{ScanRecord, ScanSummary};

/// Pause after each URL so one scan never hammers a host.
pub const DEFAULT_URL_DELAY: Duration = Duration::from_millis(100);

/// Knobs shared by every scan the service starts.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub strategies: Vec<FetchStrategy>,
    pub delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            strategies: FetchStrategy::default_chain(DEFAULT_TIMEOUT, POLITE_TIMEOUT),
            delay: DEFAULT_URL_DELAY,
        }
    }
}

/// Why one URL produced no result. Never aborts the scan.
#[derive(Debug, Error)]
pub enum UrlScanError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Runs one scan: fetch, extract and match every URL in order.
pub struct ScanWorker {
    source: Arc<dyn PageSource>,
    delay: Duration,
}

impl ScanWorker {
    pub fn new(source: Arc<dyn PageSource>, delay: Duration) -> Self {
        Self { source, delay }
    }

    /// Drive `handle` to completion over `urls` and return the final record.
    ///
    /// Per-URL failures are recorded on the record; nothing here stops the batch early.
    pub async fn run(&self, handle: &ScanHandle, keywords: &[String], urls: &[String]) -> ScanRecord {
        let total = urls.len() as u64;
        handle.start(total).await;
        info!(scan_id = handle.id(), total, keywords = keywords.len(), "scan started");

        for (idx, url) in urls.iter().enumerate() {
            handle.advance(url).await;
            debug!(scan_id = handle.id(), current = idx + 1, total, url = %url, "scanning url");

            match self.scan_url(url, keywords).await {
                Ok(matched) => {
                    if !matched.is_empty() {
                        debug!(scan_id = handle.id(), url = %url, ?matched, "keywords found");
                    }
                    let matched: Vec<&str> = matched.iter().map(String::as_str).collect();
                    handle.push_matches(url, &matched).await;
                }
                Err(e) => {
                    warn!(scan_id = handle.id(), url = %url, error = %e, "url failed");
                    handle.push_error(url, e.to_string()).await;
                }
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        let record = handle.finish().await;
        info!(
            scan_id = handle.id(),
            matches = record.matches.len(),
            errors = record.errors.len(),
            "scan finished"
        );
        record
    }

    /// Fetch, extract and match one URL on its own task so a panic anywhere in
    /// the pipeline is reported as an internal error for this URL only.
    async fn scan_url(&self, url: &str, keywords: &[String]) -> Result<Vec<String>, UrlScanError> {
        let source = self.source.clone();
        let url = url.to_string();
        let keywords = keywords.to_vec();
        tokio::spawn(async move {
            let markup = source.fetch_page(&url).await?;
            // html5ever parsing is CPU bound.
            tokio::task::spawn_blocking(move || {
                let text = extract_text(&markup);
                match_keywords(&text, &keywords)
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| UrlScanError::Internal(join_error_message(e)))
        })
        .await
        .map_err(|e| UrlScanError::Internal(join_error_message(e)))?
    }
}

fn clean_targets(urls: Vec<String>) -> Vec<String> {
    urls.into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "url processing panicked".to_string()
    }
}

/// Entry point for starting scans and reading their state.
#[derive(Clone)]
pub struct ScanService {
    registry: ScanRegistry,
    worker: Arc<ScanWorker>,
    store: Arc<dyn UrlStore>,
}

impl ScanService {
    pub fn new(registry: ScanRegistry, worker: ScanWorker, store: Arc<dyn UrlStore>) -> Self {
        Self {
            registry,
            worker: Arc::new(worker),
            store,
        }
    }

    /// Build a service that fetches over HTTP with the configured strategy chain.
    pub fn from_config(
        config: &ScanConfig,
        registry: ScanRegistry,
        store: Arc<dyn UrlStore>,
    ) -> Result<Self, reqwest::Error> {
        let fetcher = Fetcher::new(config.strategies.clone())?;
        let worker = ScanWorker::new(Arc::new(fetcher), config.delay);
        Ok(Self::new(registry, worker, store))
    }

    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn UrlStore> {
        &self.store
    }

    /// Validate input, register a queued scan and start it in the background.
    ///
    /// Returns as soon as the scan is registered. When `urls` is absent or has
    /// no usable entries, the store's enabled URLs are scanned instead.
    pub async fn trigger(
        &self,
        keywords: Vec<String>,
        urls: Option<Vec<String>>,
    ) -> Result<String, ScanError> {
        let keywords = parse_keywords(keywords);
        if keywords.is_empty() {
            return Err(ScanError::Validation("no keywords provided".into()));
        }

        let mut urls = clean_targets(urls.unwrap_or_default());
        if urls.is_empty() {
            urls = self
                .store
                .enabled_urls()
                .await
                .map_err(|e| ScanError::Store(format!("{e:#}")))?;
        }
        if urls.is_empty() {
            return Err(ScanError::Validation("no valid urls to scan".into()));
        }

        let id = ScanRegistry::new_id();
        let handle = self
            .registry
            .create(&id, keywords.clone(), urls.len() as u64)
            .await?;

        let worker = self.worker.clone();
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            let record = worker.run(&handle, &keywords, &urls).await;
            let scan_id = record.id.clone();
            if let Err(e) = store.record_scan(ScanSummary::from_record(record, urls)).await {
                warn!(scan_id = %scan_id, error = %format!("{e:#}"), "failed to persist scan summary");
            }
        });
        self.registry.attach(&id, task).await?;

        info!(scan_id = %id, "scan queued");
        Ok(id)
    }

    pub async fn status(&self, id: &str) -> Result<ScanRecord, ScanError> {
        self.registry.get(id).await
    }
}
