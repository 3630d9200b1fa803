//! Tier 1: the local transaction indexer's HTTP API. Preferred tier — keeps
//! block/tx lookups off the public internet. 5s per-call timeout; any HTTP
//! 5xx, timeout, or connection refused falls through to the next tier.

use super::types::{ScriptType, Transaction, TxInput, TxOutput};
use super::TransactionSource;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const TIER1_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_WORKERS: usize = 8;

pub struct IndexerSource {
    base_url: String,
    client: Client,
    workers: usize,
}

impl IndexerSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_workers(base_url, DEFAULT_WORKERS)
    }

    /// `workers` bounds how many block/tx fetches run concurrently against
    /// the indexer (§4.3 Tier-1 worker pool, default 8 via `indexer_workers`).
    pub fn with_workers(base_url: impl Into<String>, workers: usize) -> Self {
        let client = Client::builder()
            .timeout(TIER1_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        IndexerSource {
            base_url: base_url.into(),
            client,
            workers: workers.max(1),
        }
    }

    async fn fetch_txids(&self, txids: Vec<String>) -> Result<Vec<Transaction>, FetchError> {
        stream::iter(txids)
            .map(|txid| async move {
                let wire: WireTx = self.get_json(&format!("/tx/{txid}")).await?;
                Ok::<_, FetchError>(Transaction::from(wire))
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await.map_err(classify_error)?;
        if resp.status().is_server_error() {
            return Err(FetchError::Transient(format!(
                "{path}: server error {}",
                resp.status()
            )));
        }
        if !resp.status().is_success() {
            return Err(FetchError::InvalidTransactionData(format!(
                "{path}: status {}",
                resp.status()
            )));
        }
        resp.json::<T>().await.map_err(classify_error)
    }
}

fn classify_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(TIER1_TIMEOUT)
    } else if err.is_connect() {
        FetchError::Transient(format!("connection refused: {err}"))
    } else if err.is_decode() {
        FetchError::InvalidTransactionData(format!("malformed response: {err}"))
    } else {
        FetchError::Http(err)
    }
}

#[derive(Deserialize)]
struct WireVout {
    value_sat: u64,
    #[serde(rename = "type")]
    script_type: String,
}

#[derive(Deserialize)]
struct WireVin {
    txid: Option<String>,
}

#[derive(Deserialize)]
struct WireTx {
    txid: String,
    vin: Vec<WireVin>,
    vout: Vec<WireVout>,
    witness_bytes: u32,
    total_bytes: u32,
}

impl From<WireTx> for Transaction {
    fn from(w: WireTx) -> Self {
        let is_coinbase = w.vin.iter().all(|i| i.txid.is_none()) && !w.vin.is_empty();
        Transaction {
            txid: w.txid,
            inputs: w
                .vin
                .into_iter()
                .map(|v| TxInput { prev_txid: v.txid })
                .collect(),
            outputs: w
                .vout
                .into_iter()
                .map(|o| TxOutput {
                    amount_btc: Transaction::amount_sat_to_btc(o.value_sat),
                    script_type: ScriptType::from_indexer_label(&o.script_type),
                })
                .collect(),
            is_coinbase,
            witness_bytes: w.witness_bytes,
            total_bytes: w.total_bytes,
        }
    }
}

#[async_trait]
impl TransactionSource for IndexerSource {
    fn name(&self) -> &'static str {
        "indexer-tier1"
    }

    async fn fetch_recent(&self, block_window: u32) -> Result<Vec<Transaction>, FetchError> {
        let tip_height: u64 = self.get_json("/blocks/tip/height").await?;
        let start = tip_height.saturating_sub(block_window as u64 - 1);
        let heights: Vec<u64> = (start..=tip_height).collect();

        let per_block: Vec<Vec<Transaction>> = stream::iter(heights)
            .map(|height| async move {
                let hash: String = self.get_json(&format!("/block-height/{height}")).await?;
                let txids: Vec<String> = self.get_json(&format!("/block/{hash}/txids")).await?;
                self.fetch_txids(txids).await
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await?;
        Ok(per_block.into_iter().flatten().collect())
    }

    async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Transaction>, FetchError> {
        // The local indexer has no date-indexed endpoint; approximate by
        // scanning the blocks list for that calendar day via its timestamp.
        let path = format!("/blocks/date/{date}");
        let txids: Vec<String> = self.get_json(&path).await?;
        self.fetch_txids(txids).await
    }

    async fn healthcheck(&self) -> bool {
        self.client
            .get(format!("{}/blocks/tip/height", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status() == StatusCode::OK)
            .unwrap_or(false)
    }
}
