//! Operational entry point: run one full sync pass over all active programs
//!
//! Provider adapters are compiled in by the embedding build and registered
//! here; the stock runner starts with an empty registry, which makes every
//! active program fail fast as unsupported rather than doing anything
//! surprising.

use affsync::config::Config;
use affsync::currency::CurrencyNormalizer;
use affsync::store::Store;
use affsync::sync::{AdapterRegistry, LicenseGate, SyncEngine, Unrestricted};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!(
        "Opening store at {} (concurrency {})",
        config.db_path,
        config.concurrency
    );
    let store = Arc::new(Store::open(&config.db_path, &config.key_path)?);

    let registry = build_registry();
    if registry.is_empty() {
        log::warn!("No provider adapters registered; active programs will fail as unsupported");
    }

    let license_key = std::env::var("LICENSE_KEY").unwrap_or_default();
    let gate = Unrestricted;
    let status = gate.validate_key(&license_key).await;
    if !status.valid {
        let disabled = store.disable_all_programs().await?;
        log::error!("License key invalid; disabled {} programs", disabled);
        return Err("license invalid".into());
    }

    let normalizer = CurrencyNormalizer::new(config.rates_url.as_str(), config.rates_ttl_hours);
    let engine = SyncEngine::new(store, registry, normalizer, &config);

    let summary = engine.sync_all(status.max_programs).await;

    println!(
        "Sync finished: {} synced, {} failed, {} skipped",
        summary.synced,
        summary.failed,
        summary.skipped.len()
    );
    for result in &summary.results {
        match &result.outcome {
            Ok(periods) => println!("  ok   {} ({} periods)", result.code, periods),
            Err(e) => println!("  FAIL {} [{}]: {}", result.code, e.category(), e),
        }
    }
    for code in &summary.skipped {
        println!("  skip {} (over license quota)", code);
    }

    if !summary.results.is_empty() && summary.synced == 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Register compiled-in provider adapters here
fn build_registry() -> AdapterRegistry {
    AdapterRegistry::new()
}
