//! `WhaleSignal` (§3): the unit of data the stream emits and fans out.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleSignal {
    pub txid: String,
    pub total_btc_value: f64,
    pub total_usd_value: Option<f64>,
    pub fee_rate_sat_vb: f64,
    pub urgency_score: f64,
    pub direction: Direction,
    pub is_rbf: bool,
    pub observed_at: DateTime<Utc>,
}

/// `clip(fee_rate / 50, 0, 1)` with the piecewise bands documented in §4.6:
/// `<10 -> low (0..0.3)`, `10..50 -> medium (0.3..0.7)`, `>50 -> high (0.7..1)`.
pub fn urgency_score(fee_rate_sat_vb: f64) -> f64 {
    (fee_rate_sat_vb / 50.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_bands_match_spec() {
        assert!(urgency_score(5.0) < 0.3);
        assert!((0.3..0.7).contains(&urgency_score(25.0)));
        assert!(urgency_score(60.0) >= 0.7);
        assert_eq!(urgency_score(500.0), 1.0);
    }
}
