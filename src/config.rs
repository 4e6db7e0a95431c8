//! Runtime configuration from environment variables

use std::env;

/// Bounds for the sync worker pool.
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Configuration for the sync engine
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the snapshot file holding all entities
    pub db_path: String,

    /// Path to the symmetric key file (kept outside the snapshot)
    pub key_path: String,

    /// Worker pool size for parallel-safe programs, clamped to [1, 20]
    pub concurrency: usize,

    /// Root directory for per-program session profiles
    pub sessions_dir: String,

    /// Exchange-rate quote endpoint (USD base)
    pub rates_url: String,

    /// Exchange-rate cache TTL in hours
    pub rates_ttl_hours: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `AFFSYNC_DB_PATH` (default: affsync.json)
    /// - `AFFSYNC_KEY_PATH` (default: affsync.key)
    /// - `SYNC_CONCURRENCY` (default: 5, clamped to 1..=20)
    /// - `SESSIONS_DIR` (default: .affsync-sessions)
    /// - `RATES_URL` (default: https://open.er-api.com/v6/latest/USD)
    /// - `RATES_TTL_HOURS` (default: 24)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("AFFSYNC_DB_PATH")
                .unwrap_or_else(|_| "affsync.json".to_string()),

            key_path: env::var("AFFSYNC_KEY_PATH")
                .unwrap_or_else(|_| "affsync.key".to_string()),

            concurrency: env::var("SYNC_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONCURRENCY)
                .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),

            sessions_dir: env::var("SESSIONS_DIR")
                .unwrap_or_else(|_| ".affsync-sessions".to_string()),

            rates_url: env::var("RATES_URL")
                .unwrap_or_else(|_| "https://open.er-api.com/v6/latest/USD".to_string()),

            rates_ttl_hours: env::var("RATES_TTL_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "affsync.json".to_string(),
            key_path: "affsync.key".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            sessions_dir: ".affsync-sessions".to_string(),
            rates_url: "https://open.er-api.com/v6/latest/USD".to_string(),
            rates_ttl_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_concurrency_clamped_high() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("SYNC_CONCURRENCY", "100");
        let config = Config::from_env();
        assert_eq!(config.concurrency, MAX_CONCURRENCY);
        env::remove_var("SYNC_CONCURRENCY");
    }

    #[test]
    fn test_concurrency_clamped_low() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("SYNC_CONCURRENCY", "0");
        let config = Config::from_env();
        assert_eq!(config.concurrency, MIN_CONCURRENCY);
        env::remove_var("SYNC_CONCURRENCY");
    }

    #[test]
    fn test_garbage_concurrency_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("SYNC_CONCURRENCY", "not-a-number");
        let config = Config::from_env();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        env::remove_var("SYNC_CONCURRENCY");
    }
}
