//! Canonical transaction model shared by the engine and every fetch tier.
//! Satoshi→BTC conversion happens once, here, when a tier's wire response is
//! turned into this shape — the engine never sees satoshis (§9).

use serde::{Deserialize, Serialize};

const SATS_PER_BTC: f64 = 100_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    OpReturn,
    Other,
}

impl ScriptType {
    pub fn from_indexer_label(label: &str) -> Self {
        match label {
            "p2pkh" => ScriptType::P2pkh,
            "p2sh" => ScriptType::P2sh,
            "v0_p2wpkh" => ScriptType::P2wpkh,
            "v0_p2wsh" => ScriptType::P2wsh,
            "v1_p2tr" => ScriptType::P2tr,
            "op_return" | "nulldata" => ScriptType::OpReturn,
            _ => ScriptType::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    /// txid of the transaction whose output this input spends, if known.
    /// `None` only for coinbase inputs.
    pub prev_txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount_btc: f64,
    pub script_type: ScriptType,
}

/// The engine's sole input type. No address information, no satoshi ints —
/// both are stripped or converted by the fetch tier that produced this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub is_coinbase: bool,
    pub witness_bytes: u32,
    pub total_bytes: u32,
}

impl Transaction {
    pub fn amount_sat_to_btc(amount_sat: u64) -> f64 {
        amount_sat as f64 / SATS_PER_BTC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_type_classifies_op_return() {
        assert_eq!(ScriptType::from_indexer_label("op_return"), ScriptType::OpReturn);
        assert_eq!(ScriptType::from_indexer_label("nulldata"), ScriptType::OpReturn);
        assert_eq!(ScriptType::from_indexer_label("v1_p2tr"), ScriptType::P2tr);
        assert_eq!(ScriptType::from_indexer_label("something_new"), ScriptType::Other);
    }

    #[test]
    fn satoshi_conversion_is_exact_at_whole_btc() {
        assert_eq!(Transaction::amount_sat_to_btc(100_000_000), 1.0);
    }
}
