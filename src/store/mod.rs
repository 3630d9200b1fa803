//! The analytic store (§4.4): an append-mostly series of `PriceSample`s,
//! single-writer (the orchestrator), multi-reader (ReadAPI, WhaleStream).
//! Backed by sqlite for real range/gap queries, with an opportunistic
//! backup-file invariant borrowed in spirit from the teacher's
//! atomic-temp-file-then-rename `SharedPoolState` writes.

pub mod bulk;
pub mod schema;

use crate::error::StoreError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub utxoracle_price: f64,
    pub exchange_price: Option<f64>,
    pub confidence: f64,
    pub tx_count: i64,
    pub is_valid: bool,
}

impl PriceSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        utxoracle_price: f64,
        exchange_price: Option<f64>,
        confidence: f64,
        tx_count: i64,
        is_valid: bool,
    ) -> Self {
        PriceSample {
            timestamp,
            date: timestamp.date_naive(),
            utxoracle_price,
            exchange_price,
            confidence,
            tx_count,
            is_valid,
        }
    }
}

/// sqlite-backed implementation of §4.4's contract. Opens the primary file;
/// on open failure, transparently falls back to the sibling `.backup` file
/// and warns, per the backup invariant.
pub struct Store {
    conn: Connection,
    primary_path: PathBuf,
    backup_path: PathBuf,
    using_backup: bool,
}

impl Store {
    pub fn open(primary_path: impl AsRef<Path>, backup_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let primary_path = primary_path.as_ref().to_path_buf();
        let backup_path = backup_path.as_ref().to_path_buf();

        match Connection::open(&primary_path) {
            Ok(conn) => {
                schema::init_schema(&conn)?;
                Ok(Store {
                    conn,
                    primary_path,
                    backup_path,
                    using_backup: false,
                })
            }
            Err(primary_err) => {
                warn!(
                    error = %primary_err,
                    path = %primary_path.display(),
                    "primary store unavailable, opening backup"
                );
                let conn = Connection::open(&backup_path)?;
                schema::init_schema(&conn)?;
                Ok(Store {
                    conn,
                    primary_path,
                    backup_path,
                    using_backup: true,
                })
            }
        }
    }

    pub fn using_backup(&self) -> bool {
        self.using_backup
    }

    /// Opportunistically copies the current store file to its backup path.
    /// Called before every write-cycle (§4.4 backup invariant). Failures are
    /// logged, not propagated — a missed backup never blocks a write.
    pub fn snapshot_backup(&self) {
        let source = if self.using_backup {
            &self.backup_path
        } else {
            &self.primary_path
        };
        let dest = if self.using_backup {
            &self.primary_path
        } else {
            &self.backup_path
        };
        let tmp = dest.with_extension("tmp");
        if let Err(e) = std::fs::copy(source, &tmp).and_then(|_| std::fs::rename(&tmp, dest)) {
            warn!(error = %e, "opportunistic backup copy failed, continuing");
        }
    }

    pub fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT timestamp FROM price_sample WHERE timestamp = ?1",
                params![sample.timestamp.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateTimestamp(sample.timestamp));
        }

        self.conn.execute(
            "INSERT INTO price_sample
                (timestamp, date, utxoracle_price, exchange_price, confidence, tx_count, is_valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sample.timestamp.to_rfc3339(),
                sample.date.to_string(),
                sample.utxoracle_price,
                sample.exchange_price,
                sample.confidence,
                sample.tx_count,
                sample.is_valid,
            ],
        )?;
        Ok(())
    }

    pub fn latest(&self) -> Result<Option<PriceSample>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, date, utxoracle_price, exchange_price, confidence, tx_count, is_valid
                 FROM price_sample ORDER BY timestamp DESC LIMIT 1",
                [],
                Self::row_to_sample,
            )
            .optional()?;
        Ok(row)
    }

    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PriceSample>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, date, utxoracle_price, exchange_price, confidence, tx_count, is_valid
             FROM price_sample WHERE date >= ?1 AND date <= ?2 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![from.to_string(), to.to_string()], Self::row_to_sample)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn distinct_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM price_sample ORDER BY date ASC")?;
        let rows = stmt
            .query_map([], |row| {
                let s: String = row.get(0)?;
                Ok(s)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
            .collect())
    }

    /// Every date strictly between the first and last recorded date that
    /// has no sample (§4.4, §8 property 9).
    pub fn gaps(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let dates = self.distinct_dates()?;
        let (first, last) = match (dates.first(), dates.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Ok(Vec::new()),
        };
        let present: std::collections::HashSet<NaiveDate> = dates.into_iter().collect();
        let mut missing = Vec::new();
        let mut cursor = first;
        while cursor <= last {
            if !present.contains(&cursor) {
                missing.push(cursor);
            }
            cursor += chrono::Duration::days(1);
        }
        Ok(missing)
    }

    /// Appends one whale signal to the rolling persistence table (§4.6).
    /// The orchestrator and the whale stream never gate on this succeeding.
    pub fn record_whale_signal(&self, signal: &crate::whale::signal::WhaleSignal) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO whale_signal
                (txid, observed_at, total_btc_value, total_usd_value, fee_rate_sat_vb, urgency_score, direction, is_rbf)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                signal.txid,
                signal.observed_at.to_rfc3339(),
                signal.total_btc_value,
                signal.total_usd_value,
                signal.fee_rate_sat_vb,
                signal.urgency_score,
                format!("{:?}", signal.direction).to_uppercase(),
                signal.is_rbf,
            ],
        )?;
        Ok(())
    }

    /// Net BTC flow over the trailing `window_minutes`, signed BUY positive /
    /// SELL negative, summed from the persisted `whale_signal` table (§6
    /// `/api/whale/latest`). NEUTRAL rows (the only direction this core ever
    /// classifies today, §9 open question) contribute zero either way.
    pub fn whale_net_flow_btc(&self, window_minutes: i64) -> Result<f64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::minutes(window_minutes);
        let net: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(CASE
                WHEN direction = 'BUY' THEN total_btc_value
                WHEN direction = 'SELL' THEN -total_btc_value
                ELSE 0.0
             END), 0.0)
             FROM whale_signal WHERE observed_at >= ?1",
            params![cutoff.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(net)
    }

    /// Prunes whale signals older than the rolling retention window
    /// (default 90 days per §3 lifecycle).
    pub fn prune_whale_signals(&self, retention_days: i64) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let affected = self.conn.execute(
            "DELETE FROM whale_signal WHERE observed_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(affected)
    }

    fn row_to_sample(row: &rusqlite::Row) -> rusqlite::Result<PriceSample> {
        let timestamp_str: String = row.get(0)?;
        let date_str: String = row.get(1)?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or(timestamp.date_naive());
        Ok(PriceSample {
            timestamp,
            date,
            utxoracle_price: row.get(2)?,
            exchange_price: row.get(3)?,
            confidence: row.get(4)?,
            tx_count: row.get(5)?,
            is_valid: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: &str, price: f64, valid: bool) -> PriceSample {
        PriceSample::new(
            DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            price,
            Some(price * 1.001),
            0.9,
            1000,
            valid,
        )
    }

    #[test]
    fn append_then_latest_roundtrips() {
        let store = Store::open(":memory:", ":memory:").unwrap();
        store.append(&sample("2026-01-01T00:00:00Z", 95_000.0, true)).unwrap();
        store.append(&sample("2026-01-01T00:10:00Z", 95_100.0, true)).unwrap();
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.utxoracle_price, 95_100.0);
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let store = Store::open(":memory:", ":memory:").unwrap();
        let s = sample("2026-01-01T00:00:00Z", 95_000.0, true);
        store.append(&s).unwrap();
        let err = store.append(&s).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTimestamp(_)));
    }

    #[test]
    fn gaps_finds_missing_dates() {
        let store = Store::open(":memory:", ":memory:").unwrap();
        store.append(&sample("2026-01-01T00:00:00Z", 95_000.0, true)).unwrap();
        store.append(&sample("2026-01-02T00:00:00Z", 95_000.0, true)).unwrap();
        store.append(&sample("2026-01-04T00:00:00Z", 95_000.0, true)).unwrap();
        let gaps = store.gaps().unwrap();
        assert_eq!(gaps, vec![NaiveDate::from_ymd_opt(2026, 1, 3).unwrap()]);
    }
}
