//! Tier 2: an optional public indexer, disabled by default for privacy
//! (§4.2). Identical request pattern to Tier 1 but client-side rate-limited
//! to at most 2 requests/second.

use super::indexer::IndexerSource;
use super::types::Transaction;
use super::TransactionSource;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const MIN_INTERVAL: Duration = Duration::from_millis(500); // <= 2 req/s

/// Wraps an [`IndexerSource`]-shaped client against the public endpoint with
/// a simple last-request-timestamp rate limiter.
pub struct PublicApiSource {
    inner: IndexerSource,
    last_request: Mutex<Option<Instant>>,
}

impl PublicApiSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        PublicApiSource {
            inner: IndexerSource::new(base_url),
            last_request: Mutex::new(None),
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_INTERVAL {
                sleep(MIN_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl TransactionSource for PublicApiSource {
    fn name(&self) -> &'static str {
        "public-indexer-tier2"
    }

    async fn fetch_recent(&self, block_window: u32) -> Result<Vec<Transaction>, FetchError> {
        self.throttle().await;
        self.inner.fetch_recent(block_window).await
    }

    async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Transaction>, FetchError> {
        self.throttle().await;
        self.inner.fetch_by_date(date).await
    }

    async fn healthcheck(&self) -> bool {
        self.inner.healthcheck().await
    }
}
