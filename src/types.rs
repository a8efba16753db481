use serde::{Deserialize, Serialize};
use time::{format_description::well_known, OffsetDateTime};

/// Lifecycle of a scan. Ordering follows the allowed transitions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Queued,
    Running,
    Complete,
}

/// Live cursor of an in-flight scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub url: Option<String>,
}

/// One keyword found on one URL.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    pub keyword: String,
    pub url: String,
}

/// One URL that could not be scanned, with the reason.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UrlError {
    pub url: String,
    pub error: String,
}

/// Snapshot of a scan as seen by pollers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: String,
    pub status: ScanStatus,
    pub progress: Progress,
    pub keywords: Vec<String>,
    pub matches: Vec<KeywordMatch>,
    pub errors: Vec<UrlError>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl ScanRecord {
    pub fn new(id: impl Into<String>, keywords: Vec<String>, total: u64) -> Self {
        Self {
            id: id.into(),
            status: ScanStatus::Queued,
            progress: Progress {
                current: 0,
                total,
                url: None,
            },
            keywords,
            matches: Vec::new(),
            errors: Vec::new(),
            started_at: now_rfc3339(),
            completed_at: None,
        }
    }
}

/// Finalized scan handed to the persistence collaborator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub id: String,
    pub keywords: Vec<String>,
    pub urls_scanned: Vec<String>,
    pub matches: Vec<KeywordMatch>,
    pub errors: Vec<UrlError>,
    pub status: ScanStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl ScanSummary {
    pub fn from_record(record: ScanRecord, urls_scanned: Vec<String>) -> Self {
        Self {
            id: record.id,
            keywords: record.keywords,
            urls_scanned,
            matches: record.matches,
            errors: record.errors,
            status: record.status,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    #[default]
    Enabled,
    Disabled,
}

/// A persisted scan target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: UrlState,
    #[serde(default)]
    pub added_at: Option<String>,
}

pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
