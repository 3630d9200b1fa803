//! Layered configuration: `.env`/process environment (teacher's `config.rs`
//! pattern) overlaid on an optional static TOML file (teacher's
//! `paper_trading/toml_config.rs` pattern) for deployment-level defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_cycle_period_seconds() -> u64 {
    600
}
fn default_confidence_threshold() -> f64 {
    0.3
}
fn default_min_price_usd() -> f64 {
    10_000.0
}
fn default_max_price_usd() -> f64 {
    500_000.0
}
fn default_whale_btc_threshold() -> f64 {
    100.0
}
fn default_public_api_enabled() -> bool {
    false
}
fn default_backfill_workers() -> usize {
    4
}
fn default_indexer_workers() -> usize {
    8
}
fn default_read_api_port() -> u16 {
    8080
}
fn default_backfill_budget_per_cycle() -> usize {
    3
}
fn default_gap_alert_threshold() -> usize {
    5
}

/// Static deployment defaults, loaded from an optional TOML file. Every
/// field has a spec-mandated default, so a missing file is not an error.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TomlConfig {
    #[serde(default = "default_cycle_period_seconds")]
    pub cycle_period_seconds: u64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_min_price_usd")]
    pub min_price_usd: f64,
    #[serde(default = "default_max_price_usd")]
    pub max_price_usd: f64,
    #[serde(default = "default_whale_btc_threshold")]
    pub whale_btc_threshold: f64,
    #[serde(default = "default_public_api_enabled")]
    pub public_api_enabled: bool,
    #[serde(default = "default_backfill_workers")]
    pub backfill_workers: usize,
    #[serde(default = "default_indexer_workers")]
    pub indexer_workers: usize,
    #[serde(default = "default_read_api_port")]
    pub read_api_port: u16,
    #[serde(default = "default_backfill_budget_per_cycle")]
    pub backfill_budget_per_cycle: usize,
    #[serde(default = "default_gap_alert_threshold")]
    pub gap_alert_threshold: usize,
}

impl Default for TomlConfig {
    fn default() -> Self {
        TomlConfig {
            cycle_period_seconds: default_cycle_period_seconds(),
            confidence_threshold: default_confidence_threshold(),
            min_price_usd: default_min_price_usd(),
            max_price_usd: default_max_price_usd(),
            whale_btc_threshold: default_whale_btc_threshold(),
            public_api_enabled: default_public_api_enabled(),
            backfill_workers: default_backfill_workers(),
            indexer_workers: default_indexer_workers(),
            read_api_port: default_read_api_port(),
            backfill_budget_per_cycle: default_backfill_budget_per_cycle(),
            gap_alert_threshold: default_gap_alert_threshold(),
        }
    }
}

impl TomlConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config file {:?}", path.as_ref()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {:?}", path.as_ref()))
    }
}

/// Fully resolved runtime configuration: static TOML defaults overlaid with
/// environment-provided secrets and endpoints, per the env var table in §6.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cycle_period_seconds: u64,
    pub confidence_threshold: f64,
    pub min_price_usd: f64,
    pub max_price_usd: f64,
    pub whale_btc_threshold: f64,
    pub public_api_enabled: bool,
    pub backfill_workers: usize,
    pub indexer_workers: usize,
    pub read_api_port: u16,
    pub backfill_budget_per_cycle: usize,
    pub gap_alert_threshold: usize,

    pub indexer_base_url: String,
    pub public_indexer_base_url: Option<String>,
    pub node_rpc_url: String,
    pub node_cookie_path: Option<PathBuf>,
    pub node_rpc_user: Option<String>,
    pub node_rpc_pass: Option<String>,
    pub exchange_oracle_url: Option<String>,

    pub store_path: PathBuf,
    pub store_backup_path: PathBuf,

    pub jwt_signing_secret: String,
    pub dev_bypass: bool,
}

/// Loads configuration the way the dexarb bot's `config.rs` does: `.env`
/// first (best-effort), then required/optional environment variables
/// layered on top of an optional static TOML file.
pub fn load_config() -> Result<AppConfig> {
    dotenv::dotenv().ok();

    let toml_path =
        std::env::var("UTXORACLE_CONFIG_FILE").unwrap_or_else(|_| "utxoracle.toml".to_string());
    let toml_cfg = if Path::new(&toml_path).exists() {
        TomlConfig::load(&toml_path)?
    } else {
        TomlConfig::default()
    };

    let confidence_threshold = env_f64("CONFIDENCE_THRESHOLD", toml_cfg.confidence_threshold)?;
    let min_price_usd = env_f64("MIN_PRICE_USD", toml_cfg.min_price_usd)?;
    let max_price_usd = env_f64("MAX_PRICE_USD", toml_cfg.max_price_usd)?;
    let whale_btc_threshold = env_f64("WHALE_BTC_THRESHOLD", toml_cfg.whale_btc_threshold)?;
    let cycle_period_seconds = env_u64("CYCLE_PERIOD_SECONDS", toml_cfg.cycle_period_seconds)?;
    let public_api_enabled = env_bool("PUBLIC_API_ENABLED", toml_cfg.public_api_enabled)?;

    let indexer_base_url = std::env::var("INDEXER_BASE_URL")
        .context("INDEXER_BASE_URL must be set (Tier 1 local indexer)")?;
    let public_indexer_base_url = std::env::var("PUBLIC_INDEXER_BASE_URL").ok();
    let node_rpc_url =
        std::env::var("NODE_RPC_URL").context("NODE_RPC_URL must be set (Tier 3 direct RPC)")?;
    let node_cookie_path = std::env::var("NODE_COOKIE_PATH").ok().map(PathBuf::from);
    let node_rpc_user = std::env::var("NODE_RPC_USER").ok();
    let node_rpc_pass = std::env::var("NODE_RPC_PASS").ok();
    let exchange_oracle_url = std::env::var("EXCHANGE_ORACLE_URL").ok();

    let store_path: PathBuf = std::env::var("STORE_PATH")
        .unwrap_or_else(|_| "utxoracle.db".to_string())
        .into();
    let store_backup_path: PathBuf = std::env::var("STORE_BACKUP_PATH")
        .unwrap_or_else(|_| "utxoracle.db.backup".to_string())
        .into();

    let jwt_signing_secret =
        std::env::var("JWT_SIGNING_SECRET").context("JWT_SIGNING_SECRET must be set")?;
    let dev_bypass = std::env::var("UTXORACLE_DEV_BYPASS").is_ok();

    if node_cookie_path.is_none() && (node_rpc_user.is_none() || node_rpc_pass.is_none()) {
        anyhow::bail!("either NODE_COOKIE_PATH or NODE_RPC_USER+NODE_RPC_PASS must be set");
    }

    Ok(AppConfig {
        cycle_period_seconds,
        confidence_threshold,
        min_price_usd,
        max_price_usd,
        whale_btc_threshold,
        public_api_enabled,
        backfill_workers: toml_cfg.backfill_workers,
        indexer_workers: toml_cfg.indexer_workers,
        read_api_port: toml_cfg.read_api_port,
        backfill_budget_per_cycle: toml_cfg.backfill_budget_per_cycle,
        gap_alert_threshold: toml_cfg.gap_alert_threshold,
        indexer_base_url,
        public_indexer_base_url,
        node_rpc_url,
        node_cookie_path,
        node_rpc_user,
        node_rpc_pass,
        exchange_oracle_url,
        store_path,
        store_backup_path,
        jwt_signing_secret,
        dev_bypass,
    })
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a float")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{key} must be an integer")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{key} must be true or false")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_defaults_match_spec() {
        let cfg = TomlConfig::default();
        assert_eq!(cfg.cycle_period_seconds, 600);
        assert_eq!(cfg.confidence_threshold, 0.3);
        assert_eq!(cfg.min_price_usd, 10_000.0);
        assert_eq!(cfg.max_price_usd, 500_000.0);
        assert_eq!(cfg.whale_btc_threshold, 100.0);
        assert!(!cfg.public_api_enabled);
        assert_eq!(cfg.backfill_workers, 4);
    }

    #[test]
    fn toml_config_parses_partial_override() {
        let raw = r#"
            confidence_threshold = 0.5
        "#;
        let cfg: TomlConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.confidence_threshold, 0.5);
        assert_eq!(cfg.cycle_period_seconds, 600);
    }
}
