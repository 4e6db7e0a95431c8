//! Provider adapter boundary
//!
//! Per-provider DOM-scraping lives outside this crate. An adapter receives a
//! program, its decrypted credentials, the provider-specific config blob and
//! a freshly opened [`ExecSession`], and returns normalized per-period stats
//! or a typed failure. Adapters must be safe to call repeatedly for the same
//! period and must not keep state between invocations.
//!
//! The orchestrator depends only on the [`ProviderAdapter`] trait and the
//! [`AdapterRegistry`]; concrete provider types are never named here.

use super::session::ExecSession;
use crate::store::models::{month_anchor, Program, StatRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

/// One reporting period as scraped from a provider back-office
///
/// Counts are plain integers, money is integer minor units. `currency` is
/// the ISO code the monetary fields are quoted in; `None` means they are
/// already in the program's currency.
#[derive(Debug, Clone)]
pub struct ScrapedStat {
    pub date: NaiveDate,
    pub channel: Option<String>,
    pub clicks: u64,
    pub impressions: u64,
    pub signups: u64,
    pub ftds: u64,
    pub deposits_cents: i64,
    pub withdrawals_cents: i64,
    pub chargebacks_cents: i64,
    pub revenue_cents: i64,
    pub currency: Option<String>,
}

impl ScrapedStat {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            channel: None,
            clicks: 0,
            impressions: 0,
            signups: 0,
            ftds: 0,
            deposits_cents: 0,
            withdrawals_cents: 0,
            chargebacks_cents: 0,
            revenue_cents: 0,
            currency: None,
        }
    }

    /// Turn the scraped period into a store record (month-anchored)
    pub fn into_record(self, program_id: u64) -> StatRecord {
        StatRecord {
            program_id,
            date: month_anchor(self.date),
            channel: self.channel,
            clicks: self.clicks,
            impressions: self.impressions,
            signups: self.signups,
            ftds: self.ftds,
            deposits_cents: self.deposits_cents,
            withdrawals_cents: self.withdrawals_cents,
            chargebacks_cents: self.chargebacks_cents,
            revenue_cents: self.revenue_cents,
        }
    }
}

/// Typed adapter failures, all with human-readable messages
#[derive(Debug)]
pub enum AdapterError {
    LoginFailed(String),
    SelectorNotFound(String),
    NavigationTimeout(String),
    Other(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::LoginFailed(msg) => write!(f, "Login failed: {}", msg),
            AdapterError::SelectorNotFound(msg) => write!(f, "Selector not found: {}", msg),
            AdapterError::NavigationTimeout(msg) => write!(f, "Navigation timeout: {}", msg),
            AdapterError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// The scraping boundary implemented per provider, outside this crate
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Capability tag this adapter serves; matched against `Program.provider`
    fn provider(&self) -> &str;

    /// Scrape stats for the periods the provider reports (typically this
    /// month and last month). Must be idempotent per period.
    async fn run(
        &self,
        program: &Program,
        credentials: &str,
        config: &serde_json::Value,
        session: &mut ExecSession,
    ) -> Result<Vec<ScrapedStat>, AdapterError>;
}

/// Adapter lookup by provider tag
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let tag = adapter.provider().to_string();
        if self.adapters.insert(tag.clone(), adapter).is_some() {
            log::warn!("Adapter for provider '{}' registered twice, keeping the newer one", tag);
        }
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter(&'static str);

    #[async_trait]
    impl ProviderAdapter for NullAdapter {
        fn provider(&self) -> &str {
            self.0
        }

        async fn run(
            &self,
            _program: &Program,
            _credentials: &str,
            _config: &serde_json::Value,
            _session: &mut ExecSession,
        ) -> Result<Vec<ScrapedStat>, AdapterError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_registry_dispatch_by_tag() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(NullAdapter("acme_v1")));
        registry.register(Arc::new(NullAdapter("betco")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("acme_v1").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_into_record_anchors_month() {
        let stat = ScrapedStat::new(NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
        let record = stat.into_record(7);
        assert_eq!(record.program_id, 7);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
