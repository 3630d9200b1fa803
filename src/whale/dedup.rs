//! §4.6 deduplication: an LRU cache of size 10,000 keyed by txid. A
//! replacement (RBF) transaction evicts the prior entry and is re-emitted
//! only if its fee changed by at least 10%.

use lru::LruCache;
use std::num::NonZeroUsize;

pub const CAPACITY: usize = 10_000;
const MIN_REBROADCAST_FEE_DELTA: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
struct Seen {
    fee_rate_sat_vb: f64,
}

pub struct WhaleDedup {
    cache: LruCache<String, Seen>,
}

impl WhaleDedup {
    pub fn new() -> Self {
        WhaleDedup {
            cache: LruCache::new(NonZeroUsize::new(CAPACITY).expect("capacity is nonzero")),
        }
    }

    /// Returns `true` if this txid/fee pair should be broadcast: either it's
    /// never been seen, or it's an RBF replacement whose fee rate moved by
    /// at least 10% from the last observed value.
    pub fn should_emit(&mut self, txid: &str, fee_rate_sat_vb: f64) -> bool {
        match self.cache.get(txid) {
            None => {
                self.cache.put(txid.to_string(), Seen { fee_rate_sat_vb });
                true
            }
            Some(prev) => {
                let delta = if prev.fee_rate_sat_vb > 0.0 {
                    (fee_rate_sat_vb - prev.fee_rate_sat_vb).abs() / prev.fee_rate_sat_vb
                } else {
                    1.0
                };
                if delta >= MIN_REBROADCAST_FEE_DELTA {
                    self.cache.put(txid.to_string(), Seen { fee_rate_sat_vb });
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for WhaleDedup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_txid_same_fee_is_deduped() {
        let mut d = WhaleDedup::new();
        assert!(d.should_emit("abc", 50.0));
        assert!(!d.should_emit("abc", 50.0));
    }

    #[test]
    fn rbf_with_large_fee_bump_reemits() {
        let mut d = WhaleDedup::new();
        assert!(d.should_emit("abc", 50.0));
        assert!(d.should_emit("abc", 56.0)); // +12%
    }

    #[test]
    fn rbf_with_small_fee_bump_stays_deduped() {
        let mut d = WhaleDedup::new();
        assert!(d.should_emit("abc", 50.0));
        assert!(!d.should_emit("abc", 52.0)); // +4%
    }

    #[test]
    fn lru_evicts_oldest_after_capacity() {
        let mut d = WhaleDedup::new();
        for i in 0..CAPACITY {
            d.should_emit(&format!("tx{i}"), 50.0);
        }
        assert_eq!(d.len(), CAPACITY);
        // One more distinct entry evicts the least-recently-used (tx0).
        d.should_emit("txNEW", 50.0);
        assert!(d.should_emit("tx0", 50.0)); // re-emitted: evicted, so "unseen"
    }
}
