//! The periodic driver (§4.3): acquires the single-instance lock, fetches
//! recent transactions and the exchange price in parallel, runs the engine,
//! validates and persists the result, then spends a bounded backfill budget
//! on any recorded gaps.

pub mod exchange_oracle;
pub mod gaps;
pub mod lock;

use crate::config::AppConfig;
use crate::engine::{self, PriceResult};
use crate::error::OrchestratorError;
use crate::fetch::CascadingSource;
use crate::store::{PriceSample, Store};
use chrono::{NaiveDate, Utc};
use exchange_oracle::ExchangeOracle;
use futures::stream::{self, StreamExt};
use lock::CycleLock;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const CYCLE_DEADLINE: Duration = Duration::from_secs(8 * 60);
const DEFAULT_BLOCK_WINDOW: u32 = 144;

/// `IDLE -> LOCK_ACQUIRED -> FETCHING -> COMPUTING -> VALIDATING -> WRITING
/// -> BACKFILL -> DONE`, with `FAILED` reachable from any state while still
/// releasing the lock (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    LockAcquired,
    Fetching,
    Computing,
    Validating,
    Writing,
    Backfill,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub tx_count: usize,
    pub confidence: f64,
    pub tier_used: &'static str,
    pub is_valid: bool,
    pub backfilled_dates: usize,
    pub elapsed_ms: u128,
}

#[derive(Serialize)]
struct OperatorAlert<'a> {
    severity: &'a str,
    message: String,
    context: serde_json::Value,
}

pub struct Orchestrator {
    config: AppConfig,
    store: Store,
    source: CascadingSource,
    exchange_oracle: ExchangeOracle,
    alert_client: Client,
    webhook_url: Option<String>,
    latest_price_usd: Arc<RwLock<Option<f64>>>,
    consecutive_sanity_failures: u32,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        store: Store,
        source: CascadingSource,
        webhook_url: Option<String>,
    ) -> Self {
        let exchange_oracle = config
            .exchange_oracle_url
            .clone()
            .map(ExchangeOracle::new)
            .unwrap_or_else(|| ExchangeOracle::new(""));
        Orchestrator {
            config,
            store,
            source,
            exchange_oracle,
            alert_client: Client::new(),
            webhook_url,
            latest_price_usd: Arc::new(RwLock::new(None)),
            consecutive_sanity_failures: 0,
        }
    }

    pub fn latest_price_handle(&self) -> Arc<RwLock<Option<f64>>> {
        self.latest_price_usd.clone()
    }

    /// Runs exactly one analysis cycle, per §4.3's numbered steps.
    /// `ConfigurationError` is the only error this ever escalates past the
    /// cycle boundary; everything else is recorded and swallowed.
    pub async fn run_once(&mut self) -> Result<CycleSummary, OrchestratorError> {
        let started = std::time::Instant::now();
        let mut state = CycleState::Idle;

        let lock_path = self.config.store_path.with_extension("lock");
        let _lock = match CycleLock::acquire(&lock_path) {
            Ok(l) => {
                state = CycleState::LockAcquired;
                l
            }
            Err(e) => {
                state = CycleState::Failed(e.to_string());
                warn!(?state, "cycle aborted: lock contention");
                return Err(e);
            }
        };

        let result = tokio::time::timeout(CYCLE_DEADLINE, self.run_cycle_body(&mut state)).await;

        match result {
            Ok(Ok(summary)) => {
                info!(
                    tx_count = summary.tx_count,
                    confidence = summary.confidence,
                    tier = summary.tier_used,
                    elapsed_ms = summary.elapsed_ms,
                    "cycle complete"
                );
                Ok(summary)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "cycle failed, lock released, sample discarded");
                Ok(CycleSummary {
                    tx_count: 0,
                    confidence: 0.0,
                    tier_used: "none",
                    is_valid: false,
                    backfilled_dates: 0,
                    elapsed_ms: started.elapsed().as_millis(),
                })
            }
            Err(_) => {
                warn!("cycle exceeded deadline, aborting and discarding partial work");
                Err(OrchestratorError::DeadlineExceeded(CYCLE_DEADLINE))
            }
        }
    }

    async fn run_cycle_body(&mut self, state: &mut CycleState) -> Result<CycleSummary, OrchestratorError> {
        self.store.snapshot_backup();

        let total_gaps_before = self.store.gaps()?;

        *state = CycleState::Fetching;
        let (fetch_result, exchange_price) = tokio::join!(
            self.source.fetch_recent(DEFAULT_BLOCK_WINDOW),
            self.exchange_oracle.fetch_latest_usd_price()
        );
        let (transactions, diagnostics) = fetch_result?;

        *state = CycleState::Computing;
        let price_result: PriceResult = engine::compute(&transactions);

        *state = CycleState::Validating;
        let is_valid = self.validate(&price_result);
        if !is_valid {
            self.consecutive_sanity_failures += 1;
            if price_result.diagnostics.sanity_fail && self.consecutive_sanity_failures >= 3 {
                self.alert(
                    "critical",
                    "three consecutive sanity-check failures".to_string(),
                    json!({ "price_usd": price_result.price_usd }),
                )
                .await;
            }
        } else {
            self.consecutive_sanity_failures = 0;
        }

        if let Some(price) = price_result.price_usd {
            *self.latest_price_usd.write().await = Some(price);
        }

        *state = CycleState::Writing;
        let sample = PriceSample::new(
            Utc::now(),
            price_result.price_usd.unwrap_or(0.0),
            exchange_price,
            price_result.confidence,
            price_result.tx_count as i64,
            is_valid,
        );
        match self.store.append(&sample) {
            Ok(()) => {}
            Err(crate::error::StoreError::DuplicateTimestamp(ts)) => {
                warn!(%ts, "duplicate timestamp, skipping write");
            }
            Err(e) => return Err(e.into()),
        }

        *state = CycleState::Backfill;
        let backfilled = self.run_backfill_budget().await?;

        if gaps::should_alert(total_gaps_before.len(), self.config.gap_alert_threshold) {
            self.alert(
                "warning",
                format!("{} gap dates outstanding", total_gaps_before.len()),
                json!({ "gaps": total_gaps_before }),
            )
            .await;
        }

        *state = CycleState::Done;
        Ok(CycleSummary {
            tx_count: price_result.tx_count,
            confidence: price_result.confidence,
            tier_used: diagnostics.tier_used,
            is_valid,
            backfilled_dates: backfilled,
            elapsed_ms: 0,
        })
    }

    fn validate(&self, result: &PriceResult) -> bool {
        match result.price_usd {
            Some(p) => {
                result.confidence >= self.config.confidence_threshold
                    && p >= self.config.min_price_usd
                    && p <= self.config.max_price_usd
                    && !result.diagnostics.sanity_fail
            }
            None => false,
        }
    }

    /// Fetches and fills the cycle's backfill budget with bounded concurrency
    /// (§4.3/§5: `backfill_workers`, default 4) — fetch/compute for every
    /// gap date in the batch runs concurrently, append stays sequential
    /// since it drives the single `Store` connection.
    async fn run_backfill_budget(&mut self) -> Result<usize, OrchestratorError> {
        let batch = gaps::next_backfill_batch(&self.store, self.config.backfill_budget_per_cycle)?;
        let workers = self.config.backfill_workers.max(1);
        let this: &Orchestrator = &*self;
        let scored: Vec<(NaiveDate, Result<PriceSample, OrchestratorError>)> = stream::iter(batch)
            .map(|date| async move { (date, this.fetch_and_score(date).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut filled = 0;
        for (date, result) in scored {
            let sample = match result {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(%date, error = %e, "backfill of gap date failed, will retry next cycle");
                    continue;
                }
            };
            match self.store.append(&sample) {
                Ok(()) | Err(crate::error::StoreError::DuplicateTimestamp(_)) => filled += 1,
                Err(e) => warn!(%date, error = %e, "backfill append failed, will retry next cycle"),
            }
        }
        Ok(filled)
    }

    /// Public entry point for the CLI's `backfill --start .. --end ..`
    /// command, which drives single dates outside the regular cycle loop.
    pub async fn backfill_one_date_public(&mut self, date: NaiveDate) -> Result<(), OrchestratorError> {
        let sample = self.fetch_and_score(date).await?;
        match self.store.append(&sample) {
            Ok(()) | Err(crate::error::StoreError::DuplicateTimestamp(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches one date's transactions and scores them into a `PriceSample`,
    /// without touching the store — split out so backfill can fetch/compute
    /// concurrently across dates while still appending one at a time.
    async fn fetch_and_score(&self, date: NaiveDate) -> Result<PriceSample, OrchestratorError> {
        let (transactions, _diag) = self.source.fetch_by_date(date).await?;
        let price_result = engine::compute(&transactions);
        let is_valid = self.validate(&price_result);
        let timestamp = date
            .and_hms_opt(12, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(Utc::now);
        Ok(PriceSample::new(
            timestamp,
            price_result.price_usd.unwrap_or(0.0),
            None,
            price_result.confidence,
            price_result.tx_count as i64,
            is_valid,
        ))
    }

    async fn alert(&self, severity: &str, message: String, context: serde_json::Value) {
        let alert = OperatorAlert {
            severity,
            message: message.clone(),
            context,
        };
        match &self.webhook_url {
            Some(url) => {
                if let Err(e) = self.alert_client.post(url).json(&alert).send().await {
                    warn!(error = %e, "failed to deliver operator alert webhook");
                }
            }
            None => warn!(severity, message, "operator alert (no webhook configured)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_null_price() {
        let config = test_config();
        let store = Store::open(":memory:", ":memory:").unwrap();
        let source = crate::fetch::CascadingSource::new(vec![Box::new(NeverSource)]);
        let orchestrator = Orchestrator::new(config, store, source, None);
        let result = PriceResult {
            price_usd: None,
            confidence: 0.0,
            tx_count: 0,
            output_count: 0,
            diagnostics: Default::default(),
        };
        assert!(!orchestrator.validate(&result));
    }

    #[test]
    fn validate_rejects_sanity_failure() {
        let config = test_config();
        let store = Store::open(":memory:", ":memory:").unwrap();
        let source = crate::fetch::CascadingSource::new(vec![Box::new(NeverSource)]);
        let orchestrator = Orchestrator::new(config, store, source, None);
        let mut diagnostics = crate::engine::Diagnostics::default();
        diagnostics.sanity_fail = true;
        let result = PriceResult {
            price_usd: Some(600_000.0),
            confidence: 0.9,
            tx_count: 100,
            output_count: 200,
            diagnostics,
        };
        assert!(!orchestrator.validate(&result));
    }

    fn test_config() -> AppConfig {
        AppConfig {
            cycle_period_seconds: 600,
            confidence_threshold: 0.3,
            min_price_usd: 10_000.0,
            max_price_usd: 500_000.0,
            whale_btc_threshold: 100.0,
            public_api_enabled: false,
            backfill_workers: 4,
            indexer_workers: 8,
            read_api_port: 8080,
            backfill_budget_per_cycle: 3,
            gap_alert_threshold: 5,
            indexer_base_url: "http://127.0.0.1:0".to_string(),
            public_indexer_base_url: None,
            node_rpc_url: "http://127.0.0.1:0".to_string(),
            node_cookie_path: None,
            node_rpc_user: Some("u".to_string()),
            node_rpc_pass: Some("p".to_string()),
            exchange_oracle_url: None,
            store_path: "/tmp/utxoracle-test.db".into(),
            store_backup_path: "/tmp/utxoracle-test.db.backup".into(),
            jwt_signing_secret: "test-secret".to_string(),
            dev_bypass: true,
        }
    }

    struct NeverSource;

    #[async_trait::async_trait]
    impl crate::fetch::TransactionSource for NeverSource {
        fn name(&self) -> &'static str {
            "never"
        }
        async fn fetch_recent(&self, _: u32) -> Result<Vec<crate::fetch::Transaction>, crate::error::FetchError> {
            Ok(vec![])
        }
        async fn fetch_by_date(
            &self,
            _: NaiveDate,
        ) -> Result<Vec<crate::fetch::Transaction>, crate::error::FetchError> {
            Ok(vec![])
        }
        async fn healthcheck(&self) -> bool {
            true
        }
    }
}
