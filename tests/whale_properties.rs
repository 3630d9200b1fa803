//! Property coverage for the WhaleStream threshold/dedup/fanout behavior
//! (§8 properties 11-14, E2E-6).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use utxoracle_core::whale::dedup::{WhaleDedup, CAPACITY};
use utxoracle_core::whale::fanout::{FanoutHub, DEFAULT_QUEUE_DEPTH};
use utxoracle_core::whale::signal::Direction;
use utxoracle_core::whale::{MempoolTxEvent, WhaleStream};

#[tokio::test]
async fn property_11_threshold_boundary_is_exact() {
    let stream = WhaleStream::new(Arc::new(RwLock::new(Some(60_000.0))), FanoutHub::new(), 100.0);
    let mut rx = stream.fanout().register();

    stream
        .handle_event(
            MempoolTxEvent {
                txid: "just-under".to_string(),
                output_amounts_btc: vec![99.9999],
                fee_rate_sat_vb: 30.0,
                is_rbf: false,
            },
            None,
        )
        .await;
    assert!(rx.try_recv().is_err());

    stream
        .handle_event(
            MempoolTxEvent {
                txid: "exactly-at".to_string(),
                output_amounts_btc: vec![100.0],
                fee_rate_sat_vb: 30.0,
                is_rbf: false,
            },
            None,
        )
        .await;
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn property_12_duplicate_txid_without_fee_change_emits_once() {
    let stream = WhaleStream::new(Arc::new(RwLock::new(None)), FanoutHub::new(), 100.0);
    let mut rx = stream.fanout().register();
    let event = MempoolTxEvent {
        txid: "whale-1".to_string(),
        output_amounts_btc: vec![200.0],
        fee_rate_sat_vb: 15.0,
        is_rbf: false,
    };
    stream.handle_event(event.clone(), None).await;
    stream.handle_event(event.clone(), None).await;
    stream.handle_event(event, None).await;

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[test]
fn property_13_lru_evicts_after_capacity_plus_one_distinct_txids() {
    let mut dedup = WhaleDedup::new();
    for i in 0..CAPACITY {
        assert!(dedup.should_emit(&format!("tx{i}"), 40.0));
    }
    assert_eq!(dedup.len(), CAPACITY);

    // the (CAPACITY + 1)th distinct txid evicts tx0, the least recently used
    assert!(dedup.should_emit("overflow", 40.0));
    assert_eq!(dedup.len(), CAPACITY);
    assert!(dedup.should_emit("tx0", 40.0));
}

#[tokio::test]
async fn property_14_slow_client_never_blocks_fast_client_within_budget() {
    let hub = FanoutHub::new();
    let mut fast_rx = hub.register();
    let _slow_rx = hub.register(); // registered, never read from

    let broadcaster = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..1_000 {
                hub.broadcast(sample_signal(&format!("tx{i}")));
            }
        })
    };

    let result = tokio::time::timeout(Duration::from_secs(10), broadcaster).await;
    assert!(result.is_ok(), "broadcasting to 1000 signals must not stall on a slow client");

    let mut received = 0;
    while fast_rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, DEFAULT_QUEUE_DEPTH);
}

#[tokio::test]
async fn e2e_6_whale_signal_emission_carries_expected_fields() {
    let stream = WhaleStream::new(Arc::new(RwLock::new(Some(61_000.0))), FanoutHub::new(), 100.0);
    let mut rx = stream.fanout().register();

    stream
        .handle_event(
            MempoolTxEvent {
                txid: "e2e-whale".to_string(),
                output_amounts_btc: vec![400.0, 123.45],
                fee_rate_sat_vb: 50.0,
                is_rbf: false,
            },
            None,
        )
        .await;

    let signal = rx.try_recv().expect("signal must be emitted above threshold");
    assert_eq!(signal.txid, "e2e-whale");
    assert!((signal.total_btc_value - 523.45).abs() < 1e-9);
    assert_eq!(signal.total_usd_value, Some(523.45 * 61_000.0));
    assert_eq!(signal.urgency_score, 1.0);
    assert_eq!(signal.direction, Direction::Neutral);
    assert!(!signal.is_rbf);
}

fn sample_signal(txid: &str) -> utxoracle_core::whale::signal::WhaleSignal {
    utxoracle_core::whale::signal::WhaleSignal {
        txid: txid.to_string(),
        total_btc_value: 150.0,
        total_usd_value: None,
        fee_rate_sat_vb: 20.0,
        urgency_score: 0.4,
        direction: Direction::Neutral,
        is_rbf: false,
        observed_at: chrono::Utc::now(),
    }
}
