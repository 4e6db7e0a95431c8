//! Entity types persisted in the snapshot store
//!
//! Monetary fields are integer minor units (cents) throughout; counts are
//! plain integers. Stat values are cumulative month-to-date as reported by
//! the provider at scrape time, never deltas.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How a program authenticates against its back-office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Username/password login form
    Credentials,
    /// API key against a stats endpoint
    ApiKey,
    /// Both a login and an API key are required
    Both,
}

/// One configured affiliate-marketing account being tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Store-generated identity, never reused
    pub id: u64,
    /// Globally unique short code (e.g. "bet365-uk")
    pub code: String,
    /// Capability tag used to look up the provider adapter
    pub provider: String,
    pub auth_type: AuthType,
    pub login_url: Option<String>,
    pub stats_url: Option<String>,
    pub api_url: Option<String>,
    /// Free-form provider-specific settings
    #[serde(default)]
    pub config: serde_json::Value,
    pub is_active: bool,
    /// ISO currency code the program reports in
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Derived-revenue mode: when the provider reports no revenue figure,
    /// compute it as deposits x revshare_pct / 100
    #[serde(default)]
    pub derive_revenue: bool,
    #[serde(default)]
    pub revshare_pct: f64,
}

/// Fields supplied when creating a program; the store assigns the rest
#[derive(Debug, Clone)]
pub struct ProgramDraft {
    pub code: String,
    pub provider: String,
    pub auth_type: AuthType,
    pub login_url: Option<String>,
    pub stats_url: Option<String>,
    pub api_url: Option<String>,
    pub config: serde_json::Value,
    pub currency: String,
    pub derive_revenue: bool,
    pub revshare_pct: f64,
}

impl ProgramDraft {
    pub fn new(code: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            provider: provider.into(),
            auth_type: AuthType::Credentials,
            login_url: None,
            stats_url: None,
            api_url: None,
            config: serde_json::Value::Null,
            currency: "USD".to_string(),
            derive_revenue: false,
            revshare_pct: 0.0,
        }
    }
}

/// Encrypted credential blob, at most one per program
///
/// `ciphertext` is hex(nonce || AES-256-GCM ciphertext). Plaintext never
/// touches the snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub program_id: u64,
    pub ciphertext: String,
}

/// One month of stats for one program (and optional channel)
///
/// Keyed by `(program_id, date, channel)` where `date` is anchored to the
/// first of the month and `channel = None` means the aggregated total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub program_id: u64,
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
}

impl StatRecord {
    pub fn new(program_id: u64, date: NaiveDate) -> Self {
        Self {
            program_id,
            date: month_anchor(date),
            channel: None,
            clicks: 0,
            impressions: 0,
            signups: 0,
            ftds: 0,
            deposits_cents: 0,
            withdrawals_cents: 0,
            chargebacks_cents: 0,
            revenue_cents: 0,
        }
    }

    /// Upsert/consolidation key within one program
    pub fn key(&self) -> (NaiveDate, Option<String>) {
        (month_anchor(self.date), self.channel.clone())
    }

    /// Fold another record for the same month into this one, keeping the
    /// per-field maximum. Values are cumulative monthly totals, so summing
    /// duplicate scrapes would double-count.
    pub fn merge_max(&mut self, other: &StatRecord) {
        self.clicks = self.clicks.max(other.clicks);
        self.impressions = self.impressions.max(other.impressions);
        self.signups = self.signups.max(other.signups);
        self.ftds = self.ftds.max(other.ftds);
        self.deposits_cents = self.deposits_cents.max(other.deposits_cents);
        self.withdrawals_cents = self.withdrawals_cents.max(other.withdrawals_cents);
        self.chargebacks_cents = self.chargebacks_cents.max(other.chargebacks_cents);
        self.revenue_cents = self.revenue_cents.max(other.revenue_cents);
    }
}

/// Payment status for one program-month, created lazily
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub program_id: u64,
    /// First-of-month anchor for the month being paid
    pub month: NaiveDate,
    pub paid: bool,
    pub amount_cents: i64,
    pub notes: String,
}

/// Truncate a date to its first-of-month anchor
pub fn month_anchor(date: NaiveDate) -> NaiveDate {
    date.with_day(1).expect("day 1 exists in every month")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_anchor_truncates_day() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        assert_eq!(month_anchor(d), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_new_record_anchors_date() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        let rec = StatRecord::new(1, d);
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_merge_max_keeps_larger_values() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut a = StatRecord::new(1, d);
        a.clicks = 100;
        a.revenue_cents = 5_000;

        let mut b = StatRecord::new(1, d);
        b.clicks = 80;
        b.revenue_cents = 7_500;

        a.merge_max(&b);
        assert_eq!(a.clicks, 100);
        assert_eq!(a.revenue_cents, 7_500);
    }
}
