//! The round-USD stencil: a fixed weight vector encoding where round-dollar
//! amounts ($1, $2, $5, $10, $20, $50, $100, …) cluster in log-BTC space.
//! Sliding it across the histogram and taking the best-correlating offset
//! gives a rough BTC/USD estimate before the finer intraday pass (§4.1.d).
//!
//! The weight values are a documented reconstruction built from the same
//! round-mantissa logic the algorithm description uses (favoring mantissas
//! of 1, 2, 2.5, 5 within each decade) — see DESIGN.md for why no reference
//! data was available to calibrate this against instead.

use super::histogram::BINS_PER_DECADE;
use once_cell::sync::Lazy;

pub const STENCIL_HALF_WIDTH: i32 = 205;
pub const STENCIL_LEN: usize = (STENCIL_HALF_WIDTH * 2 + 1) as usize; // 411

const ROUND_MANTISSAS: &[(f64, f64)] = &[(1.0, 1.0), (2.0, 0.6), (2.5, 0.3), (5.0, 0.8)];
const MANTISSA_TOLERANCE: f64 = 0.02;

fn build_stencil() -> Vec<f64> {
    let mut weights = vec![0.0f64; STENCIL_LEN];
    for offset in -STENCIL_HALF_WIDTH..=STENCIL_HALF_WIDTH {
        let idx = (offset + STENCIL_HALF_WIDTH) as usize;
        let decade_frac = (offset as f64 / BINS_PER_DECADE).rem_euclid(1.0);
        let mantissa = 10f64.powf(decade_frac);
        let mut weight = 0.0;
        for &(m, base_w) in ROUND_MANTISSAS {
            let rel_dist = (mantissa - m).abs() / m;
            if rel_dist < MANTISSA_TOLERANCE {
                weight += base_w * (1.0 - rel_dist / MANTISSA_TOLERANCE);
            }
        }
        weights[idx] = weight;
    }
    weights
}

pub static STENCIL: Lazy<Vec<f64>> = Lazy::new(build_stencil);

/// Correlates `histogram` against `stencil` at integer bin offsets `k` and
/// returns `(k*, score*)`, the offset maximizing the weighted sum. Ties
/// resolve to the lower `k` because we only replace the running best on a
/// strict improvement and scan `k` in ascending order (§4.1.f).
pub fn correlate(histogram: &[f64], stencil: &[f64]) -> (i32, f64) {
    let half = (stencil.len() as i32) / 2;
    let search_range = histogram.len() as i32;
    let mut best_k = 0i32;
    let mut best_score = f64::NEG_INFINITY;

    for k in -search_range..=search_range {
        let mut score = 0.0;
        for (i, &w) in stencil.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            let hi = i as i32 - half + k;
            if hi >= 0 && (hi as usize) < histogram.len() {
                score += histogram[hi as usize] * w;
            }
        }
        if score > best_score {
            best_score = score;
            best_k = k;
        }
    }
    (best_k, best_score)
}

/// Converts a winning offset into a BTC/USD rate. The stencil is anchored at
/// a reference rate of $1/BTC (`k = 0`); each bin of offset is one
/// `1/BINS_PER_DECADE`-decade shift in the hypothesized rate.
pub fn price_from_offset(k: i32) -> f64 {
    10f64.powf(-(k as f64) / BINS_PER_DECADE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::histogram::Histogram;

    #[test]
    fn stencil_has_documented_length() {
        assert_eq!(STENCIL.len(), 411);
    }

    #[test]
    fn correlate_prefers_lower_k_on_tie() {
        let mut histogram = vec![0.0; 10];
        histogram[3] = 5.0;
        histogram[7] = 5.0;
        let stencil = vec![1.0]; // half-width 0, so score(k) == histogram[k]
        let (k, score) = correlate(&histogram, &stencil);
        assert_eq!(k, 3);
        assert_eq!(score, 5.0);
    }

    #[test]
    fn correlate_finds_shifted_spike() {
        let mut h = Histogram::new();
        h.bins[1_200] = 1000.0;
        let mut stencil = vec![0.0; 5];
        stencil[2] = 1.0;
        let (k, score) = correlate(&h.bins, &stencil);
        assert_eq!(k, 1_200);
        assert!(score > 0.0);
    }
}
