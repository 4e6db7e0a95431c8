//! The sync orchestrator
//!
//! Schedules many independent, failure-prone browser sessions:
//!
//! 1. Load active programs, clamp to the license quota (oldest first).
//! 2. Partition into isolation classes by network origin - programs that
//!    share a back-office host must never run concurrently.
//! 3. Parallel-safe programs run in fixed-size batches on a bounded worker
//!    pool; each sequential-only class runs one program at a time with a
//!    mandatory session teardown between members.
//! 4. Every job is contained: one program's failure never cancels siblings
//!    or aborts the batch.
//!
//! A program's own pipeline is strictly ordered: session open -> adapter run
//! -> teardown -> currency normalization -> one batched store commit
//! (upserts + consolidation + last_sync) -> progress event.

use super::adapter::{AdapterRegistry, ScrapedStat};
use super::error::SyncError;
use super::session::ExecSession;
use crate::config::{Config, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::currency::CurrencyNormalizer;
use crate::store::models::{AuthType, Program, StatRecord};
use crate::store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Advisory progress event emitted after each job resolves
#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub program_name: String,
    pub percent: f64,
}

/// Per-program outcome within one `sync_all` run
#[derive(Debug)]
pub struct ProgramSyncResult {
    pub program_id: u64,
    pub code: String,
    /// `Ok(n)` = synced n reporting periods; `Err` = the contained failure
    pub outcome: Result<usize, SyncError>,
}

/// Aggregate result of one `sync_all` run
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
    /// Codes of programs over the license quota - skipped, not failed
    pub skipped: Vec<String>,
    pub results: Vec<ProgramSyncResult>,
}

struct EngineInner {
    store: Arc<Store>,
    registry: AdapterRegistry,
    normalizer: CurrencyNormalizer,
    sessions_root: PathBuf,
    concurrency: usize,
    progress: Mutex<Option<mpsc::UnboundedSender<SyncProgress>>>,
}

/// The scheduler. Cheap to clone; clones share the same store, registry and
/// rate cache.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Store>,
        registry: AdapterRegistry,
        normalizer: CurrencyNormalizer,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                registry,
                normalizer,
                sessions_root: PathBuf::from(&config.sessions_dir),
                // Re-clamp in case the Config was built by hand
                concurrency: config.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
                progress: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    /// Subscribe to progress events for the next `sync_all` runs
    ///
    /// Advisory only - a dropped receiver never blocks or fails a sync.
    pub fn subscribe_progress(&self) -> mpsc::UnboundedReceiver<SyncProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.inner.progress.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(tx);
        rx
    }

    /// Sync every active program, bounded by the license quota
    ///
    /// `max_programs = None` means unrestricted. Over quota, the oldest
    /// programs (by creation time, id tie-break) win and the rest are
    /// reported as skipped. Failures are contained per program; nothing is
    /// retried within a single call.
    pub async fn sync_all(&self, max_programs: Option<usize>) -> SyncSummary {
        let mut programs = self.inner.store.list_active_programs().await;
        let mut skipped = Vec::new();

        if let Some(max) = max_programs {
            if programs.len() > max {
                let over = programs.split_off(max);
                skipped = over.into_iter().map(|p| p.code).collect();
                log::info!(
                    "License quota {}: syncing the {} oldest programs, skipping {}",
                    max,
                    programs.len(),
                    skipped.len()
                );
            }
        }

        let total = programs.len();
        if total == 0 {
            log::info!("No active programs to sync");
            return SyncSummary {
                skipped,
                ..SyncSummary::default()
            };
        }

        let (singles, sequential_classes) = partition_isolation_classes(programs);
        log::info!(
            "Syncing {} programs: {} parallel-safe (pool size {}), {} sequential classes",
            total,
            singles.len(),
            self.inner.concurrency,
            sequential_classes.len()
        );

        let done = Arc::new(AtomicUsize::new(0));
        let mut results: Vec<ProgramSyncResult> = Vec::with_capacity(total);

        // Each sequential-only class gets one task that walks its members in
        // order; the session teardown inside run_job completes before the
        // next member of the class opens its own session.
        let mut class_handles = Vec::new();
        for class in sequential_classes {
            let engine = self.clone();
            let done = done.clone();
            class_handles.push(tokio::spawn(async move {
                let mut class_results = Vec::with_capacity(class.len());
                for program in class {
                    class_results.push(engine.run_job(program, &done, total).await);
                }
                class_results
            }));
        }

        // Parallel-safe programs in fixed-size batches: all jobs in a batch
        // start together, and the batch joins only when every member has
        // resolved - success or failure.
        for batch in singles.chunks(self.inner.concurrency) {
            let mut batch_handles = Vec::with_capacity(batch.len());
            for program in batch {
                let engine = self.clone();
                let done = done.clone();
                let program = program.clone();
                batch_handles.push(tokio::spawn(async move {
                    engine.run_job(program, &done, total).await
                }));
            }
            for handle in batch_handles {
                match handle.await {
                    Ok(result) => results.push(result),
                    Err(e) => log::error!("Sync task panicked: {}", e),
                }
            }
        }

        for handle in class_handles {
            match handle.await {
                Ok(class_results) => results.extend(class_results),
                Err(e) => log::error!("Sequential class task panicked: {}", e),
            }
        }

        let synced = results.iter().filter(|r| r.outcome.is_ok()).count();
        let failed = results.len() - synced;
        log::info!(
            "Sync complete: {} synced, {} failed, {} skipped",
            synced,
            failed,
            skipped.len()
        );

        SyncSummary {
            synced,
            failed,
            skipped,
            results,
        }
    }

    /// Run one program's sync, record the outcome, emit progress
    async fn run_job(
        &self,
        program: Program,
        done: &AtomicUsize,
        total: usize,
    ) -> ProgramSyncResult {
        let program_id = program.id;
        let code = program.code.clone();

        let outcome = self.sync_program(&program).await;
        match &outcome {
            Ok(periods) => {
                log::info!("Synced {}: {} reporting period(s)", code, periods);
            }
            Err(e) => {
                // Persistence failures mean data-loss risk; everything else
                // is routine per-program noise
                if e.category() == "persistence" {
                    log::error!("Sync failed for {} [{}]: {}", code, e.category(), e);
                } else {
                    log::warn!("Sync failed for {} [{}]: {}", code, e.category(), e);
                }
                if let Err(store_err) = self
                    .inner
                    .store
                    .record_sync_result(program_id, Some(e.to_string()))
                    .await
                {
                    log::error!("Failed to record last_error for {}: {}", code, store_err);
                }
            }
        }

        let current = done.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit_progress(current, total, &code);

        ProgramSyncResult {
            program_id,
            code,
            outcome,
        }
    }

    /// One program, start to finish
    ///
    /// Configuration checks fail fast before any session opens. The session
    /// is torn down immediately after the adapter returns, before results
    /// are normalized or persisted.
    async fn sync_program(&self, program: &Program) -> Result<usize, SyncError> {
        let adapter = self
            .inner
            .registry
            .get(&program.provider)
            .ok_or_else(|| SyncError::UnsupportedProvider(program.provider.clone()))?;

        match program.auth_type {
            AuthType::Credentials | AuthType::Both => {
                if program.login_url.is_none() {
                    return Err(SyncError::MissingUrl("login URL"));
                }
            }
            AuthType::ApiKey => {
                if program.api_url.is_none() && program.stats_url.is_none() {
                    return Err(SyncError::MissingUrl("API URL"));
                }
            }
        }

        let credentials = self
            .inner
            .store
            .get_credentials(program.id)
            .await
            .ok_or(SyncError::MissingCredentials)?;

        let mut session =
            ExecSession::open(program.id, &self.inner.sessions_root).map_err(SyncError::Session)?;
        let scraped = adapter
            .run(program, &credentials, &program.config, &mut session)
            .await;
        session.teardown();
        let scraped = scraped?;

        let records = self.normalize(program, scraped).await;
        let periods = self.inner.store.commit_sync(program.id, records).await?;
        Ok(periods)
    }

    /// Convert scraped periods into store records in the program's currency
    async fn normalize(&self, program: &Program, scraped: Vec<ScrapedStat>) -> Vec<StatRecord> {
        let mut records = Vec::with_capacity(scraped.len());
        for stat in scraped {
            let source_currency = stat.currency.clone();
            let mut record = stat.into_record(program.id);

            if let Some(from) = source_currency {
                if from != program.currency {
                    let to = &program.currency;
                    record.deposits_cents = self
                        .inner
                        .normalizer
                        .convert(record.deposits_cents, &from, to)
                        .await;
                    record.withdrawals_cents = self
                        .inner
                        .normalizer
                        .convert(record.withdrawals_cents, &from, to)
                        .await;
                    record.chargebacks_cents = self
                        .inner
                        .normalizer
                        .convert(record.chargebacks_cents, &from, to)
                        .await;
                    record.revenue_cents = self
                        .inner
                        .normalizer
                        .convert(record.revenue_cents, &from, to)
                        .await;
                }
            }

            // Derived-revenue mode: providers that report deposits but no
            // revenue figure get revenue computed from the revshare split
            if program.derive_revenue && record.revenue_cents == 0 && record.deposits_cents != 0 {
                record.revenue_cents =
                    (record.deposits_cents as f64 * program.revshare_pct / 100.0).round() as i64;
            }

            records.push(record);
        }
        records
    }

    fn emit_progress(&self, current: usize, total: usize, program_name: &str) {
        let percent = if total == 0 {
            100.0
        } else {
            current as f64 / total as f64 * 100.0
        };
        log::info!(
            "Progress: {}/{} ({:.0}%) - {}",
            current,
            total,
            percent,
            program_name
        );
        let guard = self.inner.progress.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            // Receiver may be gone; progress is advisory
            let _ = tx.send(SyncProgress {
                current,
                total,
                program_name: program_name.to_string(),
                percent,
            });
        }
    }
}

/// Network origin a program's sessions will authenticate against
///
/// Programs with no parseable host are their own class (parallel-safe).
fn isolation_key(program: &Program) -> Option<String> {
    let url = program
        .login_url
        .as_deref()
        .or(program.stats_url.as_deref())
        .or(program.api_url.as_deref())?;
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// Split programs into parallel-safe singletons and sequential-only classes
///
/// Any two programs sharing a back-office host share cookie/session state,
/// so they form one class that must run strictly one at a time.
fn partition_isolation_classes(programs: Vec<Program>) -> (Vec<Program>, Vec<Vec<Program>>) {
    let mut keyed: Vec<Vec<Program>> = Vec::new();
    let mut index_by_host: HashMap<String, usize> = HashMap::new();
    let mut singles: Vec<Program> = Vec::new();

    for program in programs {
        match isolation_key(&program) {
            Some(host) => match index_by_host.get(&host) {
                Some(&i) => keyed[i].push(program),
                None => {
                    index_by_host.insert(host, keyed.len());
                    keyed.push(vec![program]);
                }
            },
            None => singles.push(program),
        }
    }

    let mut sequential = Vec::new();
    for class in keyed {
        if class.len() == 1 {
            singles.extend(class);
        } else {
            log::debug!(
                "Isolation class of {} programs: {:?}",
                class.len(),
                class.iter().map(|p| p.code.as_str()).collect::<Vec<_>>()
            );
            sequential.push(class);
        }
    }
    (singles, sequential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn program(id: u64, code: &str, login_url: Option<&str>) -> Program {
        Program {
            id,
            code: code.to_string(),
            provider: "test".to_string(),
            auth_type: AuthType::Credentials,
            login_url: login_url.map(|s| s.to_string()),
            stats_url: None,
            api_url: None,
            config: serde_json::Value::Null,
            is_active: true,
            currency: "USD".to_string(),
            created_at: Utc::now(),
            last_sync: None,
            last_error: None,
            derive_revenue: false,
            revshare_pct: 0.0,
        }
    }

    #[test]
    fn test_isolation_key_is_the_host() {
        let p = program(1, "a", Some("https://partners.example.com/login?x=1"));
        assert_eq!(isolation_key(&p), Some("partners.example.com".to_string()));
    }

    #[test]
    fn test_isolation_key_missing_urls() {
        let p = program(1, "a", None);
        assert_eq!(isolation_key(&p), None);
    }

    #[test]
    fn test_isolation_key_unparseable_url() {
        let p = program(1, "a", Some("not a url"));
        assert_eq!(isolation_key(&p), None);
    }

    #[test]
    fn test_partition_groups_shared_origin() {
        let programs = vec![
            program(1, "a", Some("https://shared.backoffice.com/a")),
            program(2, "b", Some("https://shared.backoffice.com/b")),
            program(3, "c", Some("https://solo.example.com/")),
            program(4, "d", None),
        ];
        let (singles, sequential) = partition_isolation_classes(programs);

        assert_eq!(sequential.len(), 1);
        assert_eq!(
            sequential[0].iter().map(|p| p.code.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let single_codes: Vec<_> = singles.iter().map(|p| p.code.as_str()).collect();
        assert!(single_codes.contains(&"c"));
        assert!(single_codes.contains(&"d"));
    }

    #[test]
    fn test_partition_host_is_case_insensitive() {
        let programs = vec![
            program(1, "a", Some("https://Backoffice.COM/a")),
            program(2, "b", Some("https://backoffice.com/b")),
        ];
        let (singles, sequential) = partition_isolation_classes(programs);
        assert!(singles.is_empty());
        assert_eq!(sequential.len(), 1);
        assert_eq!(sequential[0].len(), 2);
    }
}
