//! The price discovery engine (§4.1): a pure function from a transaction
//! batch to a price, confidence, and diagnostics. No I/O, no shared state
//! across calls — every invocation owns its own same-day set (§9).

pub mod convergence;
pub mod filter;
pub mod histogram;
pub mod stencil;

use crate::fetch::Transaction;
use serde::Serialize;

pub const MIN_PRICE_SANITY_USD: f64 = 10_000.0;
pub const MAX_PRICE_SANITY_USD: f64 = 500_000.0;

/// Per-invocation diagnostics: filter funnel counts plus the rough-price and
/// candidate-generation telemetry (§3 `PriceResult.diagnostics`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub total_in: usize,
    pub rejected_input_cardinality: usize,
    pub rejected_output_cardinality: usize,
    pub rejected_coinbase: usize,
    pub rejected_op_return: usize,
    pub rejected_witness_bound: usize,
    pub rejected_same_day_self_spend: usize,
    pub passed: usize,
    pub outputs_dropped_range: usize,
    pub rough_price_usd: Option<f64>,
    pub rough_correlation: f64,
    pub candidate_count: usize,
    pub sanity_fail: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceResult {
    pub price_usd: Option<f64>,
    pub confidence: f64,
    pub tx_count: usize,
    pub output_count: usize,
    pub diagnostics: Diagnostics,
}

impl PriceResult {
    fn empty(diagnostics: Diagnostics) -> Self {
        PriceResult {
            price_usd: None,
            confidence: 0.0,
            tx_count: 0,
            output_count: 0,
            diagnostics,
        }
    }
}

/// `compute(transactions) -> PriceResult`. Deterministic and referentially
/// transparent for a fixed input order (§4.1 contract).
pub fn compute(transactions: &[Transaction]) -> PriceResult {
    let filter::FilterOutput {
        amounts_btc,
        mut diagnostics,
    } = filter::filter_stage(transactions);

    if diagnostics.passed == 0 {
        return PriceResult::empty(diagnostics);
    }

    let mut hist = histogram::Histogram::build(&amounts_btc);
    hist.suppress_round_amounts();

    let (k_star, correlation) = stencil::correlate(&hist.bins, &stencil::STENCIL);
    let rough_price = if correlation >= convergence::CORRELATION_SIGNAL_THRESHOLD {
        stencil::price_from_offset(k_star)
    } else {
        convergence::FALLBACK_PRICE_USD
    };
    hist.suppress_round_dollar_amounts(
        rough_price,
        convergence::ROUND_USD_TARGETS,
        convergence::PCT_RANGE_WIDE,
    );

    // Re-correlate against the round-dollar-suppressed histogram: round-number
    // spending spikes bias the stencil match, so a second pass over the
    // smoothed bins refines the rough price the candidate window is built
    // around (§4.1.c/d).
    let (k_star_refined, correlation_refined) = stencil::correlate(&hist.bins, &stencil::STENCIL);
    let rough_price = if correlation_refined >= convergence::CORRELATION_SIGNAL_THRESHOLD {
        stencil::price_from_offset(k_star_refined)
    } else {
        rough_price
    };
    let correlation = correlation_refined.max(correlation);
    diagnostics.rough_price_usd = Some(rough_price);
    diagnostics.rough_correlation = correlation;

    let candidates = convergence::generate_candidates(&amounts_btc, rough_price);
    diagnostics.candidate_count = candidates.len();

    let below_signal_and_sparse = correlation < convergence::CORRELATION_SIGNAL_THRESHOLD
        && candidates.len() < convergence::MIN_CANDIDATES_FOR_VALID_ROUGH;
    if below_signal_and_sparse {
        return PriceResult {
            price_usd: None,
            confidence: 0.0,
            tx_count: diagnostics.passed,
            output_count: amounts_btc.len(),
            diagnostics,
        };
    }

    let price_final = convergence::geometric_median_trimmed(&candidates);
    let confidence = price_final
        .map(|_| convergence::compute_confidence(&candidates, amounts_btc.len()))
        .unwrap_or(0.0);

    if let Some(p) = price_final {
        if !(MIN_PRICE_SANITY_USD..=MAX_PRICE_SANITY_USD).contains(&p) {
            diagnostics.sanity_fail = true;
        }
    }

    PriceResult {
        price_usd: price_final,
        confidence,
        tx_count: diagnostics.passed,
        output_count: amounts_btc.len(),
        diagnostics,
    }
}
