//! Per-client fan-out (§4.6/§5): a slow WebSocket client falls behind rather
//! than blocking fast ones. Backed by `tokio::sync::broadcast` (a teacher
//! precedent — see SPEC_FULL.md §1): its fixed-capacity ring buffer
//! (default 256) silently evicts the *oldest* unread message once a lagging
//! receiver falls further behind than the capacity, which is real
//! drop-oldest semantics rather than dropping the newest arrival.

use super::signal::WhaleSignal;
use tokio::sync::broadcast;

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

#[derive(Clone)]
pub struct FanoutHub {
    sender: broadcast::Sender<WhaleSignal>,
}

impl FanoutHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_QUEUE_DEPTH);
        FanoutHub { sender }
    }

    /// Registers a new client and returns its inbound receiver. A lagging
    /// receiver's next `recv()` surfaces `RecvError::Lagged(n)` reporting how
    /// many of the oldest messages it missed, rather than ever blocking.
    pub fn register(&self) -> broadcast::Receiver<WhaleSignal> {
        self.sender.subscribe()
    }

    /// Broadcasts to every registered client. Succeeds even with zero
    /// subscribers — nobody listening isn't an error.
    pub fn broadcast(&self, signal: WhaleSignal) {
        let _ = self.sender.send(signal);
    }

    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whale::signal::Direction;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn signal(txid: &str) -> WhaleSignal {
        WhaleSignal {
            txid: txid.to_string(),
            total_btc_value: 523.45,
            total_usd_value: None,
            fee_rate_sat_vb: 50.0,
            urgency_score: 0.9,
            direction: Direction::Neutral,
            is_rbf: false,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lagging_receiver_drops_the_oldest_messages_not_the_newest() {
        let hub = FanoutHub::new();
        let mut rx = hub.register();
        for i in 0..300 {
            hub.broadcast(signal(&format!("tx{i}")));
        }

        match rx.try_recv() {
            Err(TryRecvError::Lagged(skipped)) => {
                assert_eq!(skipped, 300 - DEFAULT_QUEUE_DEPTH as u64);
            }
            other => panic!("expected Lagged, got {other:?}"),
        }

        let mut received = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            received.push(signal.txid);
        }
        assert_eq!(received.len(), DEFAULT_QUEUE_DEPTH);
        assert_eq!(received.first().unwrap(), "tx44");
        assert_eq!(received.last().unwrap(), "tx299");
    }

    #[tokio::test]
    async fn fast_reader_receives_every_signal_despite_a_never_draining_peer() {
        let hub = FanoutHub::new();
        let mut fast_rx = hub.register();
        let _slow_rx = hub.register(); // never read from

        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            while received.len() < 1000 {
                match fast_rx.recv().await {
                    Ok(signal) => received.push(signal),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            received
        });

        for i in 0..1000 {
            hub.broadcast(signal(&format!("tx{i}")));
            tokio::task::yield_now().await;
        }

        let received = tokio::time::timeout(Duration::from_secs(10), reader)
            .await
            .expect("fast reader must keep up within budget")
            .unwrap();
        assert_eq!(received.len(), 1000);
    }
}
