//! Bulk historical import path (§4.4): a CSV of
//! `(timestamp, utxoracle_price, exchange_price, confidence, tx_count)`
//! loaded through one transaction so the insert throughput isn't dominated
//! by per-row commit overhead. Target: ≥ 100k rows/s on commodity hardware.

use super::PriceSample;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::io::BufRead;
use std::path::Path;

/// Reads a CSV file and inserts every row inside a single transaction.
/// `is_valid` is computed the same way the orchestrator validates a live
/// cycle (sanity bounds + confidence threshold) rather than stored in the
/// file, since historical dumps predate the validation gate.
pub fn bulk_ingest(
    conn: &mut Connection,
    csv_path: impl AsRef<Path>,
    min_price_usd: f64,
    max_price_usd: f64,
    confidence_threshold: f64,
) -> Result<usize, StoreError> {
    let file = std::fs::File::open(csv_path.as_ref())?;
    let reader = std::io::BufReader::new(file);

    let tx = conn.transaction()?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO price_sample
                (timestamp, date, utxoracle_price, exchange_price, confidence, tx_count, is_valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line_no == 0 && line.starts_with("timestamp,") {
                continue; // header
            }
            if line.trim().is_empty() {
                continue;
            }
            let row = parse_row(&line)
                .map_err(|e| StoreError::Csv(format!("line {}: {e}", line_no + 1)))?;
            let is_valid = row.confidence >= confidence_threshold
                && row.utxoracle_price >= min_price_usd
                && row.utxoracle_price <= max_price_usd;
            stmt.execute(params![
                row.timestamp.to_rfc3339(),
                row.timestamp.date_naive().to_string(),
                row.utxoracle_price,
                row.exchange_price,
                row.confidence,
                row.tx_count,
                is_valid,
            ])?;
            inserted += 1;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

struct CsvRow {
    timestamp: DateTime<Utc>,
    utxoracle_price: f64,
    exchange_price: Option<f64>,
    confidence: f64,
    tx_count: i64,
}

fn parse_row(line: &str) -> Result<CsvRow, String> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 columns, got {}", fields.len()));
    }
    let timestamp = DateTime::parse_from_rfc3339(fields[0].trim())
        .map_err(|e| e.to_string())?
        .with_timezone(&Utc);
    let utxoracle_price: f64 = fields[1].trim().parse().map_err(|_| "bad price".to_string())?;
    let exchange_price = fields[2].trim();
    let exchange_price = if exchange_price.is_empty() {
        None
    } else {
        Some(exchange_price.parse().map_err(|_| "bad exchange price".to_string())?)
    };
    let confidence: f64 = fields[3].trim().parse().map_err(|_| "bad confidence".to_string())?;
    let tx_count: i64 = fields[4].trim().parse().map_err(|_| "bad tx_count".to_string())?;

    Ok(CsvRow {
        timestamp,
        utxoracle_price,
        exchange_price,
        confidence,
        tx_count,
    })
}

pub fn sample_to_csv_row(s: &PriceSample) -> String {
    format!(
        "{},{},{},{},{}",
        s.timestamp.to_rfc3339(),
        s.utxoracle_price,
        s.exchange_price.map(|p| p.to_string()).unwrap_or_default(),
        s.confidence,
        s.tx_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::init_schema;

    #[test]
    fn bulk_ingest_loads_rows_and_flags_validity() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        std::fs::write(
            &path,
            "timestamp,utxoracle_price,exchange_price,confidence,tx_count\n\
             2026-01-01T00:00:00Z,95000.0,95010.0,0.9,1000\n\
             2026-01-01T00:10:00Z,5000.0,5010.0,0.9,1000\n",
        )
        .unwrap();

        let inserted = bulk_ingest(&mut conn, &path, 10_000.0, 500_000.0, 0.3).unwrap();
        assert_eq!(inserted, 2);

        let invalid_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM price_sample WHERE is_valid = 0",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(invalid_count, 1);
    }
}
