//! Errors returned to callers of the scan service.

use thiserror::Error;

/// Errors surfaced by the scan service to its callers.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Rejected before any work starts.
    #[error("{0}")]
    Validation(String),
    #[error("scan not found: {0}")]
    NotFound(String),
    #[error("url store unavailable: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}
