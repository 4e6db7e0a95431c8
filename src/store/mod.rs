//! Embedded single-writer entity store
//!
//! Holds Program, Credential, StatRecord and Payment entities in memory and
//! persists them as one JSON snapshot file rewritten after every mutating
//! call (see `snapshot`). All mutations serialize through one async mutex -
//! the scraping work above the store is highly concurrent, but no two store
//! mutations are ever in flight at once. The snapshot write happens while
//! the lock is held, so callers observe mutations as atomic.
//!
//! Credentials are encrypted with the store's [`SecretBox`] before they ever
//! reach the snapshot; decryption failures read back as "no credentials".

pub mod consolidate;
pub mod models;
pub mod snapshot;

use crate::crypto::{CryptoError, SecretBox};
use chrono::{NaiveDate, Utc};
use consolidate::consolidate_program_stats;
use models::{month_anchor, Credential, Payment, Program, ProgramDraft, StatRecord};
use snapshot::{load_snapshot, save_snapshot, Snapshot};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Crypto(CryptoError),
    /// Program code already taken by another program
    DuplicateCode(String),
    /// No program with the given id
    ProgramNotFound(u64),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        StoreError::Crypto(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::Crypto(e) => write!(f, "Crypto error: {}", e),
            StoreError::DuplicateCode(code) => write!(f, "Program code already in use: {}", code),
            StoreError::ProgramNotFound(id) => write!(f, "No program with id {}", id),
        }
    }
}

impl std::error::Error for StoreError {}

/// The embedded store. Cheap to share behind an `Arc`.
pub struct Store {
    path: PathBuf,
    secrets: SecretBox,
    inner: Mutex<Snapshot>,
}

impl Store {
    /// Open (or create) the store at `db_path`, with key material at `key_path`
    pub fn open(db_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let secrets = SecretBox::load_or_create(key_path)?;
        Self::open_with(db_path, secrets)
    }

    /// Open with an already-built cipher (tests, embedding hosts)
    pub fn open_with(db_path: impl AsRef<Path>, secrets: SecretBox) -> Result<Self, StoreError> {
        let path = db_path.as_ref().to_path_buf();
        let snapshot = load_snapshot(&path)?;
        Ok(Self {
            path,
            secrets,
            inner: Mutex::new(snapshot),
        })
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        save_snapshot(snapshot, &self.path)
    }

    // ---- programs ----

    /// Create a program, enforcing code uniqueness
    pub async fn create_program(&self, draft: ProgramDraft) -> Result<Program, StoreError> {
        let mut snap = self.inner.lock().await;
        if snap.programs.iter().any(|p| p.code == draft.code) {
            return Err(StoreError::DuplicateCode(draft.code));
        }

        let program = Program {
            id: snap.next_program_id,
            code: draft.code,
            provider: draft.provider,
            auth_type: draft.auth_type,
            login_url: draft.login_url,
            stats_url: draft.stats_url,
            api_url: draft.api_url,
            config: draft.config,
            is_active: true,
            currency: draft.currency,
            created_at: Utc::now(),
            last_sync: None,
            last_error: None,
            derive_revenue: draft.derive_revenue,
            revshare_pct: draft.revshare_pct,
        };
        snap.next_program_id += 1;
        snap.programs.push(program.clone());
        self.persist(&snap)?;
        Ok(program)
    }

    /// Replace a program's fields; code uniqueness is re-checked excluding self
    pub async fn update_program(&self, program: Program) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        if snap
            .programs
            .iter()
            .any(|p| p.code == program.code && p.id != program.id)
        {
            return Err(StoreError::DuplicateCode(program.code));
        }
        let slot = snap
            .programs
            .iter_mut()
            .find(|p| p.id == program.id)
            .ok_or(StoreError::ProgramNotFound(program.id))?;
        *slot = program;
        self.persist(&snap)
    }

    pub async fn get_program(&self, id: u64) -> Option<Program> {
        let snap = self.inner.lock().await;
        snap.programs.iter().find(|p| p.id == id).cloned()
    }

    pub async fn get_program_by_code(&self, code: &str) -> Option<Program> {
        let snap = self.inner.lock().await;
        snap.programs.iter().find(|p| p.code == code).cloned()
    }

    pub async fn list_programs(&self) -> Vec<Program> {
        let snap = self.inner.lock().await;
        snap.programs.clone()
    }

    /// Active programs, oldest first (stable id tie-break)
    ///
    /// This is the order the quota clamp in the orchestrator relies on.
    pub async fn list_active_programs(&self) -> Vec<Program> {
        let snap = self.inner.lock().await;
        let mut active: Vec<Program> = snap
            .programs
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        active
    }

    /// Soft enable/disable; programs are never silently deleted
    pub async fn set_active(&self, id: u64, is_active: bool) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        let program = snap
            .programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::ProgramNotFound(id))?;
        program.is_active = is_active;
        self.persist(&snap)
    }

    /// License-gate callback: soft-disable everything. Returns how many
    /// programs were flipped.
    pub async fn disable_all_programs(&self) -> Result<usize, StoreError> {
        let mut snap = self.inner.lock().await;
        let mut flipped = 0;
        for program in snap.programs.iter_mut() {
            if program.is_active {
                program.is_active = false;
                flipped += 1;
            }
        }
        if flipped > 0 {
            log::warn!("License invalid: disabled {} active programs", flipped);
        }
        self.persist(&snap)?;
        Ok(flipped)
    }

    /// Hard delete, cascading to credentials, stats and payments
    pub async fn delete_program(&self, id: u64) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        let before = snap.programs.len();
        snap.programs.retain(|p| p.id != id);
        if snap.programs.len() == before {
            return Err(StoreError::ProgramNotFound(id));
        }
        snap.credentials.retain(|c| c.program_id != id);
        snap.stats.retain(|s| s.program_id != id);
        snap.payments.retain(|p| p.program_id != id);
        self.persist(&snap)
    }

    /// Write the outcome of a sync attempt onto the program
    ///
    /// `error = None` marks success (sets `last_sync`, clears `last_error`);
    /// `Some(msg)` records the failure without touching `last_sync`.
    pub async fn record_sync_result(
        &self,
        id: u64,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        let program = snap
            .programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::ProgramNotFound(id))?;
        match error {
            None => {
                program.last_sync = Some(Utc::now());
                program.last_error = None;
            }
            Some(msg) => {
                program.last_error = Some(msg);
            }
        }
        self.persist(&snap)
    }

    // ---- stats ----

    /// Insert or overwrite the row for `(program_id, month, channel)`
    ///
    /// The record's date is anchored to the first of the month before the
    /// key lookup; value columns are overwritten wholesale on conflict.
    pub async fn upsert_stat(&self, program_id: u64, record: StatRecord) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        if !snap.programs.iter().any(|p| p.id == program_id) {
            return Err(StoreError::ProgramNotFound(program_id));
        }
        Self::upsert_in(&mut snap.stats, program_id, record);
        self.persist(&snap)
    }

    fn upsert_in(stats: &mut Vec<StatRecord>, program_id: u64, mut record: StatRecord) {
        record.program_id = program_id;
        record.date = month_anchor(record.date);
        let key = record.key();
        match stats
            .iter_mut()
            .find(|s| s.program_id == program_id && s.key() == key)
        {
            Some(existing) => *existing = record,
            None => stats.push(record),
        }
    }

    /// Batched commit of one program's sync result: all upserts, a
    /// consolidation pass, and the `last_sync` update under one lock with a
    /// single snapshot write. One write per record would make the
    /// snapshot-rewrite cost dominate large sync batches.
    pub async fn commit_sync(
        &self,
        program_id: u64,
        records: Vec<StatRecord>,
    ) -> Result<usize, StoreError> {
        let mut snap = self.inner.lock().await;
        if !snap.programs.iter().any(|p| p.id == program_id) {
            return Err(StoreError::ProgramNotFound(program_id));
        }

        let count = records.len();
        for record in records {
            Self::upsert_in(&mut snap.stats, program_id, record);
        }
        consolidate_program_stats(&mut snap.stats, program_id);

        if let Some(program) = snap.programs.iter_mut().find(|p| p.id == program_id) {
            program.last_sync = Some(Utc::now());
            program.last_error = None;
        }

        self.persist(&snap)?;
        Ok(count)
    }

    /// Collapse duplicate month rows for one program (max-per-field policy)
    pub async fn consolidate_month(&self, program_id: u64) -> Result<usize, StoreError> {
        let mut snap = self.inner.lock().await;
        let removed = consolidate_program_stats(&mut snap.stats, program_id);
        self.persist(&snap)?;
        Ok(removed)
    }

    pub async fn list_stats(&self, program_id: u64) -> Vec<StatRecord> {
        let snap = self.inner.lock().await;
        let mut stats: Vec<StatRecord> = snap
            .stats
            .iter()
            .filter(|s| s.program_id == program_id)
            .cloned()
            .collect();
        stats.sort_by(|a, b| a.date.cmp(&b.date).then(a.channel.cmp(&b.channel)));
        stats
    }

    // ---- credentials ----

    /// Replace any existing credential for the program, encrypting first
    pub async fn save_credentials(
        &self,
        program_id: u64,
        plaintext: &str,
    ) -> Result<(), StoreError> {
        let ciphertext = self.secrets.encrypt(plaintext)?;
        let mut snap = self.inner.lock().await;
        if !snap.programs.iter().any(|p| p.id == program_id) {
            return Err(StoreError::ProgramNotFound(program_id));
        }
        snap.credentials.retain(|c| c.program_id != program_id);
        snap.credentials.push(Credential {
            program_id,
            ciphertext,
        });
        self.persist(&snap)
    }

    /// Decrypt and return the program's credentials
    ///
    /// `None` means absent OR undecryptable - both read as "cannot sync",
    /// never as an error.
    pub async fn get_credentials(&self, program_id: u64) -> Option<String> {
        let snap = self.inner.lock().await;
        let credential = snap.credentials.iter().find(|c| c.program_id == program_id)?;
        match self.secrets.decrypt(&credential.ciphertext) {
            Some(plaintext) => Some(plaintext),
            None => {
                log::warn!(
                    "Credential blob for program {} failed to decrypt, treating as absent",
                    program_id
                );
                None
            }
        }
    }

    pub async fn has_credentials(&self, program_id: u64) -> bool {
        let snap = self.inner.lock().await;
        snap.credentials.iter().any(|c| c.program_id == program_id)
    }

    /// Remove the program's credential if present; returns whether one existed
    pub async fn delete_credentials(&self, program_id: u64) -> Result<bool, StoreError> {
        let mut snap = self.inner.lock().await;
        let before = snap.credentials.len();
        snap.credentials.retain(|c| c.program_id != program_id);
        let removed = snap.credentials.len() != before;
        if removed {
            self.persist(&snap)?;
        }
        Ok(removed)
    }

    // ---- payments ----

    /// Record payment status for a program-month, creating the row lazily
    pub async fn record_payment(
        &self,
        program_id: u64,
        month: NaiveDate,
        paid: bool,
        amount_cents: i64,
        notes: impl Into<String>,
    ) -> Result<Payment, StoreError> {
        let mut snap = self.inner.lock().await;
        if !snap.programs.iter().any(|p| p.id == program_id) {
            return Err(StoreError::ProgramNotFound(program_id));
        }
        let month = month_anchor(month);
        let payment = Payment {
            program_id,
            month,
            paid,
            amount_cents,
            notes: notes.into(),
        };
        match snap
            .payments
            .iter_mut()
            .find(|p| p.program_id == program_id && p.month == month)
        {
            Some(existing) => *existing = payment.clone(),
            None => snap.payments.push(payment.clone()),
        }
        self.persist(&snap)?;
        Ok(payment)
    }

    pub async fn get_payment(&self, program_id: u64, month: NaiveDate) -> Option<Payment> {
        let month = month_anchor(month);
        let snap = self.inner.lock().await;
        snap.payments
            .iter()
            .find(|p| p.program_id == program_id && p.month == month)
            .cloned()
    }

    pub async fn list_payments(&self, program_id: u64) -> Vec<Payment> {
        let snap = self.inner.lock().await;
        let mut payments: Vec<Payment> = snap
            .payments
            .iter()
            .filter(|p| p.program_id == program_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.month.cmp(&b.month));
        payments
    }
}
