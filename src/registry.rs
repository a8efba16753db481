//! Process-wide table of scans, keyed by scan id.
//!
//! The registry is an ordinary value created at startup and cloned into
//! whoever needs it; clones share the same table. Each entry carries its own
//! lock so scans never contend with each other, and the only writer of an
//! entry is the [`ScanHandle`] returned by [`ScanRegistry::create`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ScanError;
use crate::types::{now_rfc3339, KeywordMatch, ScanRecord, ScanStatus, UrlError};

#[derive(Debug)]
struct ScanEntry {
    seq: u64,
    record: RwLock<ScanRecord>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone, Debug, Default)]
pub struct ScanRegistry {
    scans: Arc<RwLock<HashMap<String, Arc<ScanEntry>>>>,
    next_seq: Arc<AtomicU64>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh opaque scan identifier.
    pub fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Insert a queued record and hand back its sole writer.
    pub async fn create(
        &self,
        id: &str,
        keywords: Vec<String>,
        total: u64,
    ) -> Result<ScanHandle, ScanError> {
        let mut scans = self.scans.write().await;
        if scans.contains_key(id) {
            return Err(ScanError::Internal(format!("scan id already registered: {id}")));
        }
        let entry = Arc::new(ScanEntry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            record: RwLock::new(ScanRecord::new(id, keywords, total)),
            task: Mutex::new(None),
        });
        scans.insert(id.to_string(), entry.clone());
        Ok(ScanHandle {
            id: id.to_string(),
            entry,
        })
    }

    /// Snapshot of one scan.
    pub async fn get(&self, id: &str) -> Result<ScanRecord, ScanError> {
        let entry = self.entry(id).await?;
        let record = entry.record.read().await;
        Ok(record.clone())
    }

    /// Snapshots of every scan, most recently created first.
    pub async fn list(&self) -> Vec<ScanRecord> {
        let mut entries: Vec<Arc<ScanEntry>> = self.scans.read().await.values().cloned().collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.record.read().await.clone());
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.scans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Give the entry ownership of the task that drives it.
    pub async fn attach(&self, id: &str, task: JoinHandle<()>) -> Result<(), ScanError> {
        let entry = self.entry(id).await?;
        let mut slot = entry.task.lock().await;
        *slot = Some(task);
        Ok(())
    }

    /// True once the scan's task has exited (or if none was attached).
    pub async fn is_finished(&self, id: &str) -> Result<bool, ScanError> {
        let entry = self.entry(id).await?;
        let slot = entry.task.lock().await;
        Ok(slot.as_ref().map_or(true, JoinHandle::is_finished))
    }

    /// Wait for the scan's task to exit and return the final snapshot.
    pub async fn wait(&self, id: &str) -> Result<ScanRecord, ScanError> {
        let entry = self.entry(id).await?;
        let task = entry.task.lock().await.take();
        if let Some(task) = task {
            task.await
                .map_err(|e| ScanError::Internal(format!("scan task {id} failed: {e}")))?;
        }
        let record = entry.record.read().await;
        Ok(record.clone())
    }

    async fn entry(&self, id: &str) -> Result<Arc<ScanEntry>, ScanError> {
        self.scans
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ScanError::NotFound(id.to_string()))
    }
}

/// Exclusive write access to one scan record.
#[derive(Debug)]
pub struct ScanHandle {
    id: String,
    entry: Arc<ScanEntry>,
}

impl ScanHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Mark the scan running and reset the cursor for `total` URLs.
    pub async fn start(&self, total: u64) {
        let mut record = self.entry.record.write().await;
        set_status(&mut record, ScanStatus::Running);
        record.progress.total = total;
        record.progress.current = record.progress.current.min(total);
    }

    /// Move the cursor onto the next URL.
    pub async fn advance(&self, url: &str) {
        let mut record = self.entry.record.write().await;
        let progress = &mut record.progress;
        progress.current = (progress.current + 1).min(progress.total);
        progress.url = Some(url.to_string());
    }

    pub async fn push_matches(&self, url: &str, keywords: &[&str]) {
        if keywords.is_empty() {
            return;
        }
        let mut record = self.entry.record.write().await;
        record.matches.extend(keywords.iter().map(|keyword| KeywordMatch {
            keyword: keyword.to_string(),
            url: url.to_string(),
        }));
    }

    pub async fn push_error(&self, url: &str, error: impl Into<String>) {
        let mut record = self.entry.record.write().await;
        record.errors.push(UrlError {
            url: url.to_string(),
            error: error.into(),
        });
    }

    /// Mark the scan complete and return the final snapshot.
    pub async fn finish(&self) -> ScanRecord {
        let mut record = self.entry.record.write().await;
        set_status(&mut record, ScanStatus::Complete);
        record.completed_at = Some(now_rfc3339());
        record.clone()
    }

    pub async fn snapshot(&self) -> ScanRecord {
        self.entry.record.read().await.clone()
    }
}

fn set_status(record: &mut ScanRecord, next: ScanStatus) {
    if next > record.status {
        record.status = next;
    }
}
