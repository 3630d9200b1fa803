//! WhaleStream (§4.6): an independent tap on the indexer's mempool feed,
//! concurrent with the Orchestrator and sharing only the read side of the
//! store (§5).

pub mod dedup;
pub mod fanout;
pub mod signal;

use self::dedup::WhaleDedup;
use self::fanout::FanoutHub;
use self::signal::{urgency_score, Direction, WhaleSignal};
use crate::store::Store;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const RECONNECT_MIN_BACKOFF_SECS: u64 = 1;
const RECONNECT_MAX_BACKOFF_SECS: u64 = 30;

/// Inbound mempool transaction payload, as reported by the indexer's
/// `/ws/track-mempool` feed.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct MempoolTxEvent {
    pub txid: String,
    pub output_amounts_btc: Vec<f64>,
    pub fee_rate_sat_vb: f64,
    pub is_rbf: bool,
}

/// The latest known BTC/USD price, shared read-only with the stream for
/// display-only USD conversion (§4.6 direction note).
pub type LatestPriceUsd = Arc<RwLock<Option<f64>>>;

pub struct WhaleStream {
    dedup: Mutex<WhaleDedup>,
    fanout: FanoutHub,
    latest_price: LatestPriceUsd,
    whale_btc_threshold: f64,
}

impl WhaleStream {
    /// `fanout` is shared with the caller (typically the Read API's
    /// `AppState`) rather than built internally, so signals detected here
    /// actually reach `/ws/whale` subscribers (§4.6/§5).
    pub fn new(latest_price: LatestPriceUsd, fanout: FanoutHub, whale_btc_threshold: f64) -> Self {
        WhaleStream {
            dedup: Mutex::new(WhaleDedup::new()),
            fanout,
            latest_price,
            whale_btc_threshold,
        }
    }

    pub fn fanout(&self) -> &FanoutHub {
        &self.fanout
    }

    /// Evaluates one mempool event against the threshold/dedup gates and,
    /// if it should be emitted, builds the signal, fans it out, and
    /// persists it (without gating on the persistence write, per §4.6).
    pub async fn handle_event(&self, event: MempoolTxEvent, store: Option<&Store>) {
        let total_btc_value: f64 = event.output_amounts_btc.iter().sum();
        if total_btc_value < self.whale_btc_threshold {
            return;
        }

        let should_emit = {
            let mut dedup = self.dedup.lock().await;
            dedup.should_emit(&event.txid, event.fee_rate_sat_vb)
        };
        if !should_emit {
            return;
        }

        let price = *self.latest_price.read().await;
        let signal = WhaleSignal {
            txid: event.txid,
            total_btc_value,
            total_usd_value: price.map(|p| total_btc_value * p),
            fee_rate_sat_vb: event.fee_rate_sat_vb,
            urgency_score: urgency_score(event.fee_rate_sat_vb),
            // Direction classification needs an exchange-address oracle this
            // core doesn't have (§9 open question); NEUTRAL is documented
            // behavior, not a missing feature.
            direction: Direction::Neutral,
            is_rbf: event.is_rbf,
            observed_at: Utc::now(),
        };

        self.fanout.broadcast(signal.clone());

        if let Some(store) = store {
            if let Err(e) = store.record_whale_signal(&signal) {
                warn!(error = %e, txid = %signal.txid, "failed to persist whale signal");
            }
        }
    }

    /// Long-lived task: maintains the mempool WebSocket subscription with
    /// exponential backoff (1s -> 30s, ±20% jitter) and unbounded retries
    /// until cancelled (§5).
    pub async fn run(
        self: Arc<Self>,
        ws_url: String,
        store: Option<Arc<Store>>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut backoff_secs = RECONNECT_MIN_BACKOFF_SECS;
        loop {
            if *shutdown.borrow() {
                return;
            }
            match tokio_tungstenite::connect_async(&ws_url).await {
                Ok((ws_stream, _)) => {
                    info!(url = %ws_url, "whale stream connected");
                    backoff_secs = RECONNECT_MIN_BACKOFF_SECS;
                    let (mut write, mut read) = ws_stream.split();
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                let _ = write.close().await;
                                return;
                            }
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        match serde_json::from_str::<MempoolTxEvent>(&text) {
                                            Ok(event) => self.handle_event(event, store.as_deref()).await,
                                            Err(e) => warn!(error = %e, "malformed mempool event"),
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) | None => break,
                                    Some(Err(e)) => {
                                        error!(error = %e, "whale stream read error");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, backoff_secs, "whale stream connect failed");
                }
            }

            let jitter = 1.0 + (rand_jitter() * 0.2 - 0.1);
            let sleep_secs = (backoff_secs as f64 * jitter).max(1.0);
            tokio::time::sleep(tokio::time::Duration::from_secs_f64(sleep_secs)).await;
            backoff_secs = (backoff_secs * 2).min(RECONNECT_MAX_BACKOFF_SECS);
        }
    }
}

/// A small deterministic-enough jitter source without pulling in a full RNG
/// crate for one call site; seeded from the current instant's subsecond
/// component so repeated calls still vary.
fn rand_jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn below_threshold_transaction_is_not_emitted() {
        let stream = WhaleStream::new(Arc::new(RwLock::new(Some(95_000.0))), FanoutHub::new(), 100.0);
        let mut rx = stream.fanout().register();
        stream
            .handle_event(
                MempoolTxEvent {
                    txid: "small".to_string(),
                    output_amounts_btc: vec![99.9999],
                    fee_rate_sat_vb: 50.0,
                    is_rbf: false,
                },
                None,
            )
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn at_threshold_transaction_is_emitted() {
        let stream = WhaleStream::new(Arc::new(RwLock::new(Some(95_000.0))), FanoutHub::new(), 100.0);
        let mut rx = stream.fanout().register();
        stream
            .handle_event(
                MempoolTxEvent {
                    txid: "big".to_string(),
                    output_amounts_btc: vec![100.0],
                    fee_rate_sat_vb: 50.0,
                    is_rbf: false,
                },
                None,
            )
            .await;
        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.total_btc_value, 100.0);
    }

    #[tokio::test]
    async fn duplicate_txid_emits_once() {
        let stream = WhaleStream::new(Arc::new(RwLock::new(None)), FanoutHub::new(), 100.0);
        let mut rx = stream.fanout().register();
        let event = MempoolTxEvent {
            txid: "dup".to_string(),
            output_amounts_btc: vec![150.0],
            fee_rate_sat_vb: 20.0,
            is_rbf: false,
        };
        stream.handle_event(event.clone(), None).await;
        stream.handle_event(event, None).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
