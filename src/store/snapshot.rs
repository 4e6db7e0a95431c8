//! Full-file snapshot persistence for the store
//!
//! The durable representation is one JSON file holding every entity,
//! rewritten after each mutating call. Writes go through a temp file and an
//! atomic rename so a crash mid-write leaves the previous snapshot intact.
//! Cost per write is proportional to total store size, which is why the
//! orchestrator commits a whole program's sync result as a single mutation.

use super::models::{Credential, Payment, Program, StatRecord};
use super::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the store persists, as one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Next program id to hand out; ids are never reused
    pub next_program_id: u64,
    pub programs: Vec<Program>,
    pub credentials: Vec<Credential>,
    pub stats: Vec<StatRecord>,
    pub payments: Vec<Payment>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            next_program_id: 1,
            programs: Vec::new(),
            credentials: Vec::new(),
            stats: Vec::new(),
            payments: Vec::new(),
        }
    }
}

/// Load a snapshot from disk, or an empty one if the file does not exist yet
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, StoreError> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("No existing snapshot at {}, starting empty", path.display());
        return Ok(Snapshot::default());
    }

    let json = fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&json)?;
    log::info!(
        "Loaded snapshot from {}: {} programs, {} stat records",
        path.display(),
        snapshot.programs.len(),
        snapshot.stats.len()
    );
    Ok(snapshot)
}

/// Write the snapshot atomically (temp file + rename)
pub fn save_snapshot(snapshot: &Snapshot, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;

    log::debug!(
        "Saved snapshot to {} ({} programs, {} stat records)",
        path.display(),
        snapshot.programs.len(),
        snapshot.stats.len()
    );
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
