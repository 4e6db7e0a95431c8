//! Sync orchestration: scheduling, isolation, failure containment
//!
//! Module organization:
//!
//! - `adapter` - the provider adapter boundary and registry
//! - `session` - program-scoped execution sessions (profile isolation)
//! - `license` - license gate boundary (quota + disable-all signal)
//! - `error` - the sync failure taxonomy
//! - `orchestrator` - `SyncEngine::sync_all` itself

pub mod adapter;
pub mod error;
pub mod license;
pub mod orchestrator;
pub mod session;

pub use adapter::{AdapterError, AdapterRegistry, ProviderAdapter, ScrapedStat};
pub use error::SyncError;
pub use license::{FixedQuota, LicenseGate, LicenseStatus, Unrestricted};
pub use orchestrator::{ProgramSyncResult, SyncEngine, SyncProgress, SyncSummary};
pub use session::ExecSession;
