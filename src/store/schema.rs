//! Schema definitions and migration-free `init-db` creation (§4.4).

use rusqlite::Connection;

/// `timestamp` is the unique primary key, `date` gets its own secondary
/// index for range/gap queries. A companion `whale_signal` table backs the
/// WhaleStream's rolling persistence (§4.6), out of the read path except
/// where §6 documents it.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS price_sample (
    timestamp        TEXT    NOT NULL PRIMARY KEY,
    date             TEXT    NOT NULL,
    utxoracle_price  REAL    NOT NULL,
    exchange_price   REAL,
    confidence       REAL    NOT NULL,
    tx_count         INTEGER NOT NULL,
    is_valid         INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_sample_date ON price_sample(date);

CREATE TABLE IF NOT EXISTS whale_signal (
    txid              TEXT    NOT NULL,
    observed_at       TEXT    NOT NULL,
    total_btc_value   REAL    NOT NULL,
    total_usd_value   REAL,
    fee_rate_sat_vb   REAL    NOT NULL,
    urgency_score     REAL    NOT NULL,
    direction         TEXT    NOT NULL,
    is_rbf            INTEGER NOT NULL,
    PRIMARY KEY (txid, observed_at)
);

CREATE INDEX IF NOT EXISTS idx_whale_signal_observed_at ON whale_signal(observed_at);
"#;

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
