//! Exchange price oracle client (§6): one tolerant call per cycle. Failure
//! is never fatal — the cycle simply records `exchange_price = null`.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct ExchangePriceResponse {
    #[serde(rename = "USD")]
    usd: f64,
}

pub struct ExchangeOracle {
    url: String,
    client: Client,
}

impl ExchangeOracle {
    pub fn new(url: impl Into<String>) -> Self {
        ExchangeOracle {
            url: url.into(),
            client: Client::builder()
                .timeout(EXCHANGE_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
        }
    }

    /// `None` on any failure — network error, timeout, or malformed body —
    /// per §6/§7's tolerant-failure policy for this collaborator.
    pub async fn fetch_latest_usd_price(&self) -> Option<f64> {
        match self.client.get(&self.url).send().await {
            Ok(resp) => match resp.json::<ExchangePriceResponse>().await {
                Ok(body) => Some(body.usd),
                Err(e) => {
                    warn!(error = %e, "exchange oracle returned unparseable body");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "exchange oracle request failed");
                None
            }
        }
    }
}
