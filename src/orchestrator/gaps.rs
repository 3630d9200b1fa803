//! Gap-repair bookkeeping layered over the store's `gaps()` query: turns a
//! list of missing dates into a bounded per-cycle backfill plan and decides
//! when the gap count warrants an operator alert (§4.3 steps 2, 7, 8).

use crate::store::Store;
use chrono::NaiveDate;

/// Returns up to `budget` gap dates to backfill this cycle, oldest first —
/// so a long-standing gap doesn't get starved behind newer ones.
pub fn next_backfill_batch(store: &Store, budget: usize) -> Result<Vec<NaiveDate>, crate::error::StoreError> {
    let mut gaps = store.gaps()?;
    gaps.truncate(budget);
    Ok(gaps)
}

/// Whether the full (unbudgeted) gap count crosses the alert threshold.
pub fn should_alert(total_gap_count: usize, threshold: usize) -> bool {
    total_gap_count >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_threshold_is_inclusive() {
        assert!(!should_alert(4, 5));
        assert!(should_alert(5, 5));
        assert!(should_alert(6, 5));
    }
}
