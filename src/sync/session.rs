//! Program-scoped execution sessions
//!
//! Every sync job gets a freshly allocated session: its own profile
//! directory (cookie jar / browser profile) keyed by program id, so two
//! programs never observe each other's authentication state even when they
//! run in the same batch. Teardown removes the profile wholesale; the
//! sequential-class scheduler tears one program's session down before the
//! next program in the class opens its own, which is what prevents session
//! bleed-through between same-origin providers.

use std::fs;
use std::path::{Path, PathBuf};

/// A scoped, per-program isolation context handed to the adapter
pub struct ExecSession {
    program_id: u64,
    profile_dir: PathBuf,
    torn_down: bool,
}

impl ExecSession {
    /// Allocate a fresh session for one program
    ///
    /// Any stale profile left over from a crashed run is wiped first, so the
    /// adapter always starts from a clean cookie jar.
    pub fn open(program_id: u64, sessions_root: impl AsRef<Path>) -> std::io::Result<Self> {
        let profile_dir = sessions_root
            .as_ref()
            .join(format!("program-{}", program_id));
        if profile_dir.exists() {
            fs::remove_dir_all(&profile_dir)?;
        }
        fs::create_dir_all(&profile_dir)?;
        log::debug!(
            "Opened session for program {} at {}",
            program_id,
            profile_dir.display()
        );
        Ok(Self {
            program_id,
            profile_dir,
            torn_down: false,
        })
    }

    pub fn program_id(&self) -> u64 {
        self.program_id
    }

    /// Directory the adapter should point its browser profile / cookie jar at
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Explicit teardown: remove the profile and everything in it
    pub fn teardown(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Err(e) = fs::remove_dir_all(&self.profile_dir) {
            // Nothing actionable for the caller; the next open() wipes it anyway
            log::warn!(
                "Failed to remove session profile {}: {}",
                self.profile_dir.display(),
                e
            );
        } else {
            log::debug!("Tore down session for program {}", self.program_id);
        }
    }
}

impl Drop for ExecSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}
