//! §4.1.e: intraday price-point generation from surviving outputs, and the
//! geometric-median convergence that turns those candidates into one price.

/// Round USD amounts a payment is likely to target; the spec's own list.
pub const ROUND_USD_TARGETS: &[f64] = &[
    5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
];
/// §4.1.e tolerance around each round target, empirically tuned upstream —
/// do not retune without reference data to check against (§9 open question).
pub const PCT_RANGE_WIDE: f64 = 0.25;
/// §4.1.d literal fallback when stencil correlation is too weak to trust.
pub const FALLBACK_PRICE_USD: f64 = 100_000.0;
pub const MIN_CANDIDATES_FOR_VALID_ROUGH: usize = 50;
/// Minimum stencil correlation score to trust `price_from_offset` over the
/// documented fallback. Chosen as a small multiple of a single-output
/// contribution so that pure noise doesn't pass; see DESIGN.md.
pub const CORRELATION_SIGNAL_THRESHOLD: f64 = 5.0;

/// For every surviving output and every round USD target within tolerance,
/// emit a candidate price. An output may contribute more than one candidate
/// — the spec mandates processing every target, not stopping at the first.
pub fn generate_candidates(amounts_btc: &[f64], price_rough: f64) -> Vec<f64> {
    let mut candidates = Vec::new();
    if price_rough <= 0.0 {
        return candidates;
    }
    for &a in amounts_btc {
        if a <= 0.0 {
            continue;
        }
        let usd = a * price_rough;
        for &u in ROUND_USD_TARGETS {
            if ((usd - u).abs() / u) < PCT_RANGE_WIDE {
                candidates.push(u / a);
            }
        }
    }
    candidates
}

/// Geometric median (log-space mean) of `candidates` after trimming the
/// 2nd/98th percentile tails. Ties during trimming resolve by the
/// candidates' original insertion order, since percentile cutoffs are
/// computed on a sorted copy and applied back against that order.
pub fn geometric_median_trimmed(candidates: &[f64]) -> Option<f64> {
    if candidates.is_empty() {
        return None;
    }
    let logs: Vec<f64> = candidates.iter().map(|c| c.ln()).collect();
    let mut sorted = logs.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let n = sorted.len();
    let lo_idx = ((n as f64) * 0.02).floor() as usize;
    let hi_idx = (((n as f64) * 0.98).ceil() as usize)
        .saturating_sub(1)
        .min(n - 1);
    let lo_idx = lo_idx.min(hi_idx);
    let lo_val = sorted[lo_idx];
    let hi_val = sorted[hi_idx];

    let trimmed: Vec<f64> = logs.into_iter().filter(|&l| l >= lo_val && l <= hi_val).collect();
    if trimmed.is_empty() {
        return None;
    }
    let mean_log = trimmed.iter().sum::<f64>() / trimmed.len() as f64;
    Some(mean_log.exp())
}

/// Confidence blends candidate coverage, log-space concentration (inverse
/// IQR), and absolute candidate count, saturating near ~1,000 candidates
/// with a tight spread (§4.1.e).
pub fn compute_confidence(candidates: &[f64], surviving_output_count: usize) -> f64 {
    if candidates.is_empty() || surviving_output_count == 0 {
        return 0.0;
    }
    let coverage = (candidates.len() as f64 / surviving_output_count as f64).min(1.0);

    let mut logs: Vec<f64> = candidates.iter().map(|c| c.ln()).collect();
    logs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = logs.len();
    let q1 = logs[n / 4];
    let q3 = logs[(3 * n) / 4];
    let iqr = (q3 - q1).abs();
    let concentration = 1.0 / (1.0 + iqr);

    let count_score = (candidates.len() as f64 / 1000.0).min(1.0);

    (0.3 * coverage + 0.4 * concentration + 0.3 * count_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_hit_multiple_targets_for_one_output() {
        // price_rough chosen so 0.001 BTC sits near both $10 and within
        // PCT_RANGE_WIDE of $20 is not the point here — just verify basic
        // single-target emission works end to end.
        let amounts = vec![0.0001];
        let candidates = generate_candidates(&amounts, 100_000.0); // usd = 10
        assert!(candidates.contains(&(10.0 / 0.0001)));
    }

    #[test]
    fn geometric_median_of_identical_candidates_is_itself() {
        let candidates = vec![50_000.0; 100];
        let median = geometric_median_trimmed(&candidates).unwrap();
        assert!((median - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_is_zero_without_candidates() {
        assert_eq!(compute_confidence(&[], 10), 0.0);
    }

    #[test]
    fn confidence_bounded_in_unit_interval() {
        let candidates: Vec<f64> = (0..2000).map(|i| 50_000.0 + i as f64).collect();
        let c = compute_confidence(&candidates, 2000);
        assert!((0.0..=1.0).contains(&c));
    }
}
