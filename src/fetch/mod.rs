//! The 3-tier acquisition pipeline (§4.2): local indexer → optional public
//! indexer → direct node RPC, expressed as three implementations of one
//! capability trait behind a cascading wrapper (§9 polymorphism note).

pub mod indexer;
pub mod node_rpc;
pub mod public_api;
pub mod types;

pub use types::{ScriptType, Transaction, TxInput, TxOutput};

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One data source capable of serving transaction batches. Implemented by
/// each tier; the cascade just tries them in order.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_recent(&self, block_window: u32) -> Result<Vec<Transaction>, FetchError>;

    async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Transaction>, FetchError>;

    async fn healthcheck(&self) -> bool;
}

/// Diagnostics about which tier actually served a request.
#[derive(Debug, Clone)]
pub struct FetchDiagnostics {
    pub tier_used: &'static str,
    pub latency: Duration,
    pub retries: u32,
}

/// Holds an ordered list of sources and falls through to the next one on
/// any tier failure, per the deterministic cascade order in §4.2. The last
/// tier (direct node RPC) must always be reachable; its failure propagates.
pub struct CascadingSource {
    tiers: Vec<Box<dyn TransactionSource>>,
}

impl CascadingSource {
    pub fn new(tiers: Vec<Box<dyn TransactionSource>>) -> Self {
        assert!(!tiers.is_empty(), "cascade requires at least one tier");
        CascadingSource { tiers }
    }

    pub async fn fetch_recent(
        &self,
        block_window: u32,
    ) -> Result<(Vec<Transaction>, FetchDiagnostics), FetchError> {
        let mut retries = 0u32;
        let last = self.tiers.len() - 1;
        for (idx, tier) in self.tiers.iter().enumerate() {
            let started = Instant::now();
            match tier.fetch_recent(block_window).await {
                Ok(txs) => return Ok(Self::served(tier.as_ref(), txs, started, retries)),
                Err(err) if idx == last => return Err(Self::exhausted(tier.as_ref(), err)),
                Err(err) => {
                    Self::fell_through(tier.as_ref(), err);
                    retries += 1;
                }
            }
        }
        Err(FetchError::UpstreamUnavailable)
    }

    pub async fn fetch_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<(Vec<Transaction>, FetchDiagnostics), FetchError> {
        let mut retries = 0u32;
        let last = self.tiers.len() - 1;
        for (idx, tier) in self.tiers.iter().enumerate() {
            let started = Instant::now();
            match tier.fetch_by_date(date).await {
                Ok(txs) => return Ok(Self::served(tier.as_ref(), txs, started, retries)),
                Err(err) if idx == last => return Err(Self::exhausted(tier.as_ref(), err)),
                Err(err) => {
                    Self::fell_through(tier.as_ref(), err);
                    retries += 1;
                }
            }
        }
        Err(FetchError::UpstreamUnavailable)
    }

    fn served(
        tier: &dyn TransactionSource,
        txs: Vec<Transaction>,
        started: Instant,
        retries: u32,
    ) -> (Vec<Transaction>, FetchDiagnostics) {
        info!(tier = tier.name(), tx_count = txs.len(), "fetch tier served request");
        (
            txs,
            FetchDiagnostics {
                tier_used: tier.name(),
                latency: started.elapsed(),
                retries,
            },
        )
    }

    fn exhausted(tier: &dyn TransactionSource, err: FetchError) -> FetchError {
        warn!(tier = tier.name(), error = %err, "final fetch tier failed");
        FetchError::UpstreamUnavailable
    }

    fn fell_through(tier: &dyn TransactionSource, err: FetchError) {
        warn!(tier = tier.name(), error = %err, "fetch tier failed, falling through");
    }
}
