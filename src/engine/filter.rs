//! §4.1.a filter stage: narrows a raw transaction batch down to the
//! payment-like, non-consolidation, non-inscription outputs the histogram
//! is built from.

use crate::engine::Diagnostics;
use crate::fetch::types::{ScriptType, Transaction};
use std::collections::HashSet;

const MAX_INPUT_CARDINALITY: usize = 5;
const REQUIRED_OUTPUT_CARDINALITY: usize = 2;
/// Reject a transaction when witness bytes make up more than this fraction
/// of total size — characteristic of Ordinals-style inscriptions rather than
/// a payment (spec leaves the exact bound to be "characteristic"; this is
/// the chosen threshold, see DESIGN.md).
const WITNESS_DOMINANCE_THRESHOLD: f64 = 0.65;
const MIN_OUTPUT_BTC: f64 = 1e-5;
const MAX_OUTPUT_BTC: f64 = 1e5;

pub struct FilterOutput {
    pub amounts_btc: Vec<f64>,
    pub diagnostics: Diagnostics,
}

/// Applies every filter rule in order, then the per-output range filter on
/// the outputs of transactions that survive. The same-day self-spend set
/// `accepted_ids` grows only after a transaction's full accept/reject
/// decision is made — checking it before inserting the current id is the
/// ordering invariant §4.1.a.6 and §8 property 2 pin down.
pub fn filter_stage(transactions: &[Transaction]) -> FilterOutput {
    let mut diagnostics = Diagnostics {
        total_in: transactions.len(),
        ..Default::default()
    };
    let mut amounts = Vec::new();
    let mut accepted_ids: HashSet<&str> = HashSet::new();

    for tx in transactions {
        if tx.inputs.len() > MAX_INPUT_CARDINALITY {
            diagnostics.rejected_input_cardinality += 1;
            continue;
        }
        if tx.outputs.len() != REQUIRED_OUTPUT_CARDINALITY {
            diagnostics.rejected_output_cardinality += 1;
            continue;
        }
        if tx.is_coinbase {
            diagnostics.rejected_coinbase += 1;
            continue;
        }
        if tx
            .outputs
            .iter()
            .any(|o| o.script_type == ScriptType::OpReturn)
        {
            diagnostics.rejected_op_return += 1;
            continue;
        }
        if tx.total_bytes > 0
            && (tx.witness_bytes as f64 / tx.total_bytes as f64) > WITNESS_DOMINANCE_THRESHOLD
        {
            diagnostics.rejected_witness_bound += 1;
            continue;
        }
        let self_spend = tx.inputs.iter().any(|i| {
            i.prev_txid
                .as_deref()
                .is_some_and(|id| accepted_ids.contains(id))
        });
        if self_spend {
            diagnostics.rejected_same_day_self_spend += 1;
            continue;
        }

        accepted_ids.insert(tx.txid.as_str());
        diagnostics.passed += 1;

        for output in &tx.outputs {
            if output.amount_btc > MIN_OUTPUT_BTC && output.amount_btc < MAX_OUTPUT_BTC {
                amounts.push(output.amount_btc);
            } else {
                diagnostics.outputs_dropped_range += 1;
            }
        }
    }

    FilterOutput {
        amounts_btc: amounts,
        diagnostics,
    }
}
