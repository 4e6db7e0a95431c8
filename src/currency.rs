//! Exchange-rate cache and minor-unit currency conversion
//!
//! Rates are quoted against a USD base and cross-rates are derived
//! arithmetically, never fetched pairwise. The cache holds one table with a
//! TTL (default 24h); on miss or staleness a fresh table is fetched from the
//! quote endpoint, and on ANY fetch failure we fall back to the static table
//! below. A sync must never fail solely because rate refresh failed.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Last-resort rates (units per 1 USD), used when the remote fetch fails
/// and no previous table is cached. Deliberately coarse.
const FALLBACK_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("CAD", 1.36),
    ("AUD", 1.52),
    ("NZD", 1.66),
    ("SEK", 10.45),
    ("NOK", 10.65),
    ("DKK", 6.87),
    ("PLN", 3.98),
    ("CHF", 0.88),
    ("JPY", 149.50),
    ("BRL", 5.05),
    ("MXN", 17.10),
    ("ZAR", 18.70),
];

/// Quote endpoint response (open.er-api.com shape)
#[derive(Debug, Deserialize)]
struct RatesResponse {
    result: String,
    rates: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateSource {
    Remote,
    Fallback,
}

struct RateTable {
    rates: HashMap<String, f64>,
    fetched_at: Instant,
    source: RateSource,
}

/// Converts monetary amounts between currencies using a TTL-bounded rate cache
///
/// Injected into the sync engine rather than living as a process global, so
/// its lifetime (and its cache) is scoped to the engine that owns it.
pub struct CurrencyNormalizer {
    rates_url: String,
    ttl: Duration,
    client: reqwest::Client,
    cache: Mutex<Option<RateTable>>,
}

impl CurrencyNormalizer {
    pub fn new(rates_url: impl Into<String>, ttl_hours: u64) -> Self {
        Self {
            rates_url: rates_url.into(),
            ttl: Duration::from_secs(ttl_hours * 3600),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            cache: Mutex::new(None),
        }
    }

    /// Normalizer that never touches the network (static table only)
    ///
    /// Used by tests and by hosts that run fully offline.
    pub fn offline() -> Self {
        let normalizer = Self::new("", u64::MAX / 3600);
        {
            let mut cache = normalizer.cache.try_lock().expect("fresh mutex");
            *cache = Some(RateTable {
                rates: fallback_table(),
                fetched_at: Instant::now(),
                source: RateSource::Fallback,
            });
        }
        normalizer
    }

    /// Convert an amount in minor units from one currency to another
    ///
    /// Exact identity when `from == to`. Unknown currency codes degrade to a
    /// 1.0 rate with a warning rather than failing the sync.
    pub async fn convert(&self, amount_minor: i64, from: &str, to: &str) -> i64 {
        if from == to {
            return amount_minor;
        }

        let mut cache = self.cache.lock().await;
        self.ensure_fresh(&mut cache).await;

        let table = cache.as_ref().expect("ensure_fresh always seeds a table");
        let rate_from = lookup_rate(&table.rates, from);
        let rate_to = lookup_rate(&table.rates, to);

        // Cross-rate through the USD base
        (amount_minor as f64 * rate_to / rate_from).round() as i64
    }

    /// Refresh the cached table if absent or older than the TTL
    async fn ensure_fresh(&self, cache: &mut Option<RateTable>) {
        if let Some(table) = cache.as_ref() {
            if table.fetched_at.elapsed() < self.ttl {
                return;
            }
        }

        match self.fetch_remote().await {
            Ok(rates) => {
                log::info!("Refreshed exchange rates ({} currencies)", rates.len());
                *cache = Some(RateTable {
                    rates,
                    fetched_at: Instant::now(),
                    source: RateSource::Remote,
                });
            }
            Err(e) => {
                log::warn!("Exchange rate refresh failed, using fallback: {}", e);
                match cache.as_mut() {
                    // Keep serving the stale table rather than regressing to
                    // the coarse fallback
                    Some(table) if table.source == RateSource::Remote => {
                        table.fetched_at = Instant::now();
                    }
                    _ => {
                        *cache = Some(RateTable {
                            rates: fallback_table(),
                            fetched_at: Instant::now(),
                            source: RateSource::Fallback,
                        });
                    }
                }
            }
        }
    }

    async fn fetch_remote(
        &self,
    ) -> Result<HashMap<String, f64>, Box<dyn std::error::Error + Send + Sync>> {
        if self.rates_url.is_empty() {
            return Err("no rates URL configured".into());
        }

        let resp: RatesResponse = self
            .client
            .get(&self.rates_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if resp.result != "success" {
            return Err(format!("quote endpoint returned result={}", resp.result).into());
        }
        if !resp.rates.contains_key("USD") {
            return Err("quote endpoint response missing USD base".into());
        }
        Ok(resp.rates)
    }
}

fn fallback_table() -> HashMap<String, f64> {
    FALLBACK_RATES
        .iter()
        .map(|(code, rate)| (code.to_string(), *rate))
        .collect()
}

fn lookup_rate(rates: &HashMap<String, f64>, code: &str) -> f64 {
    match rates.get(code) {
        Some(rate) if *rate > 0.0 => *rate,
        _ => {
            log::warn!("No exchange rate for {}, passing amount through unconverted", code);
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_currency_is_exact_identity() {
        let n = CurrencyNormalizer::offline();
        assert_eq!(n.convert(12_345, "USD", "USD").await, 12_345);
        assert_eq!(n.convert(0, "EUR", "EUR").await, 0);
        // Identity holds even for codes the table has never heard of
        assert_eq!(n.convert(999, "XXX", "XXX").await, 999);
    }

    #[tokio::test]
    async fn test_round_trip_within_rounding_tolerance() {
        let n = CurrencyNormalizer::offline();
        let original = 1_000_000i64; // $10,000.00
        let eur = n.convert(original, "USD", "EUR").await;
        let back = n.convert(eur, "EUR", "USD").await;
        assert!((back - original).abs() <= 1, "round trip drifted: {} -> {}", original, back);
    }

    #[tokio::test]
    async fn test_cross_rate_derived_through_base() {
        let n = CurrencyNormalizer::offline();
        // EUR -> GBP never hits a pairwise quote; it goes through USD
        let gbp = n.convert(10_000, "EUR", "GBP").await;
        let expected = (10_000f64 * 0.79 / 0.92).round() as i64;
        assert_eq!(gbp, expected);
    }

    #[tokio::test]
    async fn test_unknown_currency_passes_through() {
        let n = CurrencyNormalizer::offline();
        // Unknown code degrades to rate 1.0 instead of failing the sync
        assert_eq!(n.convert(5_000, "XYZ", "USD").await, 5_000);
    }

    #[tokio::test]
    async fn test_failed_fetch_never_errors() {
        // Bogus URL, empty cache: convert must still produce a number
        let n = CurrencyNormalizer::new("http://127.0.0.1:1/latest/USD", 24);
        let eur = n.convert(10_000, "USD", "EUR").await;
        assert_eq!(eur, (10_000f64 * 0.92).round() as i64);
    }
}
