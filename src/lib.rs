//! # affsync — affiliate stats sync engine
//!
//! Aggregates performance metrics (clicks, signups, FTDs, deposits, revenue)
//! from third-party affiliate back-offices that expose no common API.
//! Per-provider scraping lives behind the [`sync::ProviderAdapter`] boundary;
//! this crate owns everything around it:
//!
//! - `store` - embedded single-writer store (JSON snapshot per mutation)
//! - `crypto` - credential-at-rest encryption (AES-256-GCM, separate key file)
//! - `currency` - exchange-rate cache + minor-unit conversion
//! - `sync` - the orchestrator: isolation classes, bounded worker pool,
//!   per-program failure containment
//! - `config` - environment-driven runtime configuration


pub mod config;
pub mod crypto;
pub mod currency;
pub mod store;
pub mod sync;

pub use config::Config;
pub use store::Store;
pub use sync::SyncEngine;
