//! Crate-wide error kinds, per the error handling design in §7.
//!
//! The engine never raises on bad input data — see [`engine`](crate::engine),
//! which reports failure via `PriceResult` diagnostics instead. These types
//! cover the boundaries that do fail: fetch tiers, the store, and the
//! orchestrator's own bookkeeping.

use thiserror::Error;

/// Errors raised while acquiring transactions from any fetch tier.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient network error: {0}")]
    Transient(String),

    #[error("all fetch tiers exhausted")]
    UpstreamUnavailable,

    #[error("malformed transaction data from tier: {0}")]
    InvalidTransactionData(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised by the analytic store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate timestamp: {0}")]
    DuplicateTimestamp(chrono::DateTime<chrono::Utc>),

    #[error("csv parse error: {0}")]
    Csv(String),

    #[error("primary store unavailable, opened backup: {0}")]
    OpenedBackup(String),
}

/// Errors surfaced by the orchestrator cycle driver.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("lock contention: another cycle is running")]
    LockContention,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cycle exceeded deadline of {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

/// The engine itself does not raise errors for data problems (see §7's
/// propagation policy); this type exists only for genuine programmer-error
/// invariant violations (e.g. a filtered transaction with `output_count != 2`
/// leaking into the histogram stage), which should never occur in practice.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
