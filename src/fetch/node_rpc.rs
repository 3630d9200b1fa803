//! Tier 3: direct Bitcoin node JSON-RPC. The tier of last resort — it must
//! always be reachable; a failure here is fatal to the cascade (§4.2).
//! Request/response shape and cookie-file auth follow the same pattern as
//! a conventional bitcoind JSON-RPC client: one POST per call, incrementing
//! numeric id, classified retry-vs-fatal error handling on the transport.

use super::types::{ScriptType, Transaction, TxInput, TxOutput};
use super::TransactionSource;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const GETBLOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// How the RPC client proves itself to the node.
pub enum Auth {
    CookieFile(PathBuf),
    UserPass(String, String),
}

impl Auth {
    fn get_user_pass(&self) -> Result<(String, String), FetchError> {
        match self {
            Auth::UserPass(u, p) => Ok((u.clone(), p.clone())),
            Auth::CookieFile(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    FetchError::InvalidTransactionData(format!(
                        "reading cookie file {path:?}: {e}"
                    ))
                })?;
                let mut parts = raw.trim().splitn(2, ':');
                let user = parts.next().unwrap_or_default().to_string();
                let pass = parts.next().unwrap_or_default().to_string();
                Ok((user, pass))
            }
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct NodeRpcSource {
    url: String,
    auth: Auth,
    client: Client,
    next_id: AtomicU64,
}

impl NodeRpcSource {
    pub fn new(url: impl Into<String>, auth: Auth) -> Self {
        NodeRpcSource {
            url: url.into(),
            auth,
            client: Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let (user, pass) = self.auth.get_user_pass()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "1.0",
            id,
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.url)
            .basic_auth(user, Some(pass))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !resp.status().is_success() {
            return Err(FetchError::InvalidTransactionData(format!(
                "{method}: http status {}",
                resp.status()
            )));
        }

        let parsed: RpcResponse<T> = resp.json().await.map_err(classify_transport_error)?;
        if let Some(err) = parsed.error {
            return Err(FetchError::InvalidTransactionData(format!(
                "{method}: rpc error {} {}",
                err.code, err.message
            )));
        }
        parsed
            .result
            .ok_or_else(|| FetchError::InvalidTransactionData(format!("{method}: empty result")))
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(GETBLOCK_TIMEOUT)
    } else if err.is_connect() {
        FetchError::Transient(format!("node unreachable: {err}"))
    } else if err.is_decode() {
        FetchError::InvalidTransactionData(format!("malformed rpc response: {err}"))
    } else {
        FetchError::Http(err)
    }
}

#[derive(Deserialize)]
struct RpcVin {
    txid: Option<String>,
}

#[derive(Deserialize)]
struct RpcScriptPubKey {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct RpcVout {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RpcScriptPubKey,
}

#[derive(Deserialize)]
struct RpcTx {
    txid: String,
    vin: Vec<RpcVin>,
    vout: Vec<RpcVout>,
    weight: u32,
    #[serde(default)]
    total_size: u32,
}

#[derive(Deserialize)]
struct RpcBlock {
    tx: Vec<RpcTx>,
}

impl From<RpcTx> for Transaction {
    fn from(t: RpcTx) -> Self {
        let is_coinbase = t.vin.iter().all(|v| v.txid.is_none()) && !t.vin.is_empty();
        // getblock verbosity=2 doesn't break out witness bytes directly;
        // invert weight = 3*base_size + total_size for witness_bytes =
        // total_size - base_size = (4*total_size - weight) / 3.
        let witness_bytes = if t.total_size > 0 {
            ((4.0 * t.total_size as f64 - t.weight as f64) / 3.0).max(0.0) as u32
        } else {
            0
        };
        Transaction {
            txid: t.txid,
            inputs: t
                .vin
                .into_iter()
                .map(|v| TxInput { prev_txid: v.txid })
                .collect(),
            outputs: t
                .vout
                .into_iter()
                .map(|o| TxOutput {
                    amount_btc: o.value,
                    script_type: ScriptType::from_indexer_label(&o.script_pub_key.kind),
                })
                .collect(),
            is_coinbase,
            witness_bytes,
            total_bytes: t.total_size.max(witness_bytes),
        }
    }
}

#[async_trait]
impl TransactionSource for NodeRpcSource {
    fn name(&self) -> &'static str {
        "node-rpc-tier3"
    }

    async fn fetch_recent(&self, block_window: u32) -> Result<Vec<Transaction>, FetchError> {
        let tip_height: u64 = self
            .call("getblockcount", json!([]), Duration::from_secs(5))
            .await?;
        let start = tip_height.saturating_sub(block_window as u64 - 1);
        let mut all = Vec::new();
        for height in start..=tip_height {
            let hash: String = self
                .call("getblockhash", json!([height]), Duration::from_secs(5))
                .await?;
            let block: RpcBlock = self
                .call("getblock", json!([hash, 2]), GETBLOCK_TIMEOUT)
                .await?;
            all.extend(block.tx.into_iter().map(Transaction::from));
        }
        Ok(all)
    }

    async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Transaction>, FetchError> {
        // No date index over JSON-RPC; the orchestrator's backfill path is
        // expected to resolve `date` to a height range before calling this
        // tier directly when doing gap repair against node RPC alone.
        let _ = date;
        Err(FetchError::InvalidTransactionData(
            "node RPC tier requires a height, not a date — resolve via the indexer first"
                .to_string(),
        ))
    }

    async fn healthcheck(&self) -> bool {
        self.call::<u64>("getblockcount", json!([]), Duration::from_secs(2))
            .await
            .is_ok()
    }
}
