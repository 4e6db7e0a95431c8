//! License gate boundary
//!
//! Validation against the remote license server lives in the host; this
//! crate only consumes the result. The quota is read once per `sync_all`
//! invocation, never per job. When a previously-valid license goes invalid
//! the host calls `Store::disable_all_programs()`.

use async_trait::async_trait;

/// Outcome of a license check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseStatus {
    pub valid: bool,
    /// Maximum active programs billable under this license; `None` = unlimited
    pub max_programs: Option<usize>,
}

impl LicenseStatus {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            max_programs: Some(0),
        }
    }
}

#[async_trait]
pub trait LicenseGate: Send + Sync {
    async fn validate_key(&self, key: &str) -> LicenseStatus;
}

/// Gate that accepts any key with no program cap (development, self-hosting)
pub struct Unrestricted;

#[async_trait]
impl LicenseGate for Unrestricted {
    async fn validate_key(&self, _key: &str) -> LicenseStatus {
        LicenseStatus {
            valid: true,
            max_programs: None,
        }
    }
}

/// Gate with a fixed quota, independent of the key (tests, offline tiers)
pub struct FixedQuota(pub usize);

#[async_trait]
impl LicenseGate for FixedQuota {
    async fn validate_key(&self, _key: &str) -> LicenseStatus {
        LicenseStatus {
            valid: true,
            max_programs: Some(self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unrestricted_has_no_cap() {
        let status = Unrestricted.validate_key("anything").await;
        assert!(status.valid);
        assert_eq!(status.max_programs, None);
    }

    #[tokio::test]
    async fn test_fixed_quota_caps() {
        let status = FixedQuota(5).validate_key("anything").await;
        assert_eq!(status.max_programs, Some(5));
    }
}
