//! Migration Utility.
//!
//! Upgrades a vault whose blob files are stored without the C2 frame
//! (legacy plaintext-on-disk, `*.dat`) to the current format: snapshot,
//! encrypt-in-place, verify, and roll back on partial failure.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::crypto;
use crate::error::{VaultError, VaultResult};
use crate::file_store::atomic_write;
use crate::frame::{is_encrypted_frame, BLOB_MAGIC};

#[derive(Debug)]
pub enum MigrationResult {
    Success { snapshot_path: PathBuf, migrated: usize },
    PartialFailure { snapshot_path: PathBuf, success_count: usize, total: usize, failures: Vec<String> },
}

#[derive(Debug, Default)]
pub struct RollbackReport {
    pub restored: usize,
    pub failed: Vec<String>,
}

pub struct MigrationUtility {
    files_dir: PathBuf,
    backups_dir: PathBuf,
}

impl MigrationUtility {
    pub fn new(vault_root: &Path) -> Self {
        Self { files_dir: vault_root.join("files"), backups_dir: vault_root.join("backups") }
    }

    /// Lists legacy `*.dat` files whose leading bytes do not sniff as a
    /// framed blob.
    pub fn scan(&self) -> VaultResult<Vec<PathBuf>> {
        let mut legacy = Vec::new();
        if !self.files_dir.exists() {
            return Ok(legacy);
        }

        for entry in std::fs::read_dir(&self.files_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("dat") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            if !is_encrypted_frame(&bytes, BLOB_MAGIC) {
                legacy.push(path);
            }
        }
        Ok(legacy)
    }

    /// Snapshots every legacy file, then encrypts each in place under
    /// `password`. Rolls back automatically if any file fails.
    pub fn migrate(&self, password: &[u8]) -> VaultResult<MigrationResult> {
        let legacy = self.scan()?;
        let total = legacy.len();

        let snapshot_path = self.snapshot(&legacy)?;

        let mut success_count = 0usize;
        let mut failures = Vec::new();

        for path in &legacy {
            match self.migrate_one(path, password) {
                Ok(()) => success_count += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "legacy file migration failed");
                    failures.push(format!("{}: {e}", path.display()));
                }
            }
        }

        if success_count < total {
            let _ = self.rollback(&snapshot_path);
            return Ok(MigrationResult::PartialFailure { snapshot_path, success_count, total, failures });
        }

        info!(migrated = success_count, "legacy blob migration complete");
        Ok(MigrationResult::Success { snapshot_path, migrated: success_count })
    }

    fn migrate_one(&self, path: &Path, password: &[u8]) -> VaultResult<()> {
        let plaintext = std::fs::read(path)?;
        let frame = crypto::encrypt(&plaintext, password)?;
        atomic_write(path, &frame.serialize(BLOB_MAGIC))?;

        let rewritten = std::fs::read(path)?;
        if !is_encrypted_frame(&rewritten, BLOB_MAGIC) {
            return Err(VaultError::InvalidState(format!(
                "{} did not sniff as a framed blob after migration",
                path.display()
            )));
        }
        Ok(())
    }

    fn snapshot(&self, legacy: &[PathBuf]) -> VaultResult<PathBuf> {
        let ts = chrono::Utc::now().timestamp_millis();
        let snapshot_dir = self.backups_dir.join(format!("file_migration_backup_{ts}"));
        std::fs::create_dir_all(&snapshot_dir)?;

        for path in legacy {
            if let Some(name) = path.file_name() {
                std::fs::copy(path, snapshot_dir.join(name))?;
            }
        }
        Ok(snapshot_dir)
    }

    /// Copies every file from `snapshot_path` back into `files/`,
    /// overwriting whatever is there. Reports per-file failures rather
    /// than aborting on the first one.
    pub fn rollback(&self, snapshot_path: &Path) -> VaultResult<RollbackReport> {
        let mut report = RollbackReport::default();

        for entry in std::fs::read_dir(snapshot_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let target = self.files_dir.join(&name);
            match std::fs::copy(entry.path(), &target) {
                Ok(_) => report.restored += 1,
                Err(e) => report.failed.push(format!("{}: {e}", name.to_string_lossy())),
            }
        }

        Ok(report)
    }
}
