//! Sync failure taxonomy
//!
//! Configuration errors fail fast before any session opens; adapter errors
//! are caught per program and recorded as `last_error`; persistence errors
//! also surface per program but signal data-loss risk and are logged at
//! error level by the orchestrator. Nothing below the orchestrator throws
//! uncaught.

use super::adapter::AdapterError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum SyncError {
    /// No credential stored (or it failed to decrypt) - checked before any
    /// session is opened
    MissingCredentials,
    /// The URL required by the program's auth type is not configured
    MissingUrl(&'static str),
    /// No adapter registered for the program's provider tag
    UnsupportedProvider(String),
    /// Could not allocate the program's isolated session
    Session(std::io::Error),
    /// The provider adapter failed (login, selectors, timeouts)
    Adapter(AdapterError),
    /// Persisting the results failed - data-loss risk, never swallowed
    Store(StoreError),
}

impl SyncError {
    /// Coarse bucket for logs and summaries
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::MissingCredentials
            | SyncError::MissingUrl(_)
            | SyncError::UnsupportedProvider(_) => "config",
            SyncError::Session(_) => "session",
            SyncError::Adapter(_) => "adapter",
            SyncError::Store(_) => "persistence",
        }
    }

    /// Whether this failure was detected before a session was opened
    pub fn is_config(&self) -> bool {
        self.category() == "config"
    }
}

impl From<AdapterError> for SyncError {
    fn from(err: AdapterError) -> Self {
        SyncError::Adapter(err)
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err)
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::MissingCredentials => write!(f, "No credentials stored for this program"),
            SyncError::MissingUrl(which) => write!(f, "Missing {} for this program", which),
            SyncError::UnsupportedProvider(tag) => {
                write!(f, "No adapter registered for provider '{}'", tag)
            }
            SyncError::Session(e) => write!(f, "Session setup failed: {}", e),
            SyncError::Adapter(e) => write!(f, "{}", e),
            SyncError::Store(e) => write!(f, "Failed to persist results: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}
