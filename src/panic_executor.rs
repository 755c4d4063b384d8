//! Panic Executor.
//!
//! Secure-deletes every vault-owned artifact and terminates the process.
//! Split into a testable [`PanicExecutor::wipe`] and a
//! [`PanicExecutor::execute_and_exit`] that never returns, so the
//! coordinator's public contract ("PANIC never returns") holds while tests
//! can still exercise the wipe logic without ending the test process.

use std::path::PathBuf;

use crate::error::VaultResult;
use crate::secure_delete::secure_delete;

pub struct PanicExecutor {
    vault_root: PathBuf,
}

impl PanicExecutor {
    pub fn new(vault_root: PathBuf) -> Self {
        Self { vault_root }
    }

    /// Enumerates and secure-deletes every file under `files/`, the
    /// metadata primary and its backups, the password config, and any
    /// corrupt-primary snapshots; then removes the now-empty vault
    /// directories. Idempotent: running twice on an already-wiped vault is
    /// a no-op. Best-effort — individual failures are swallowed because
    /// panic mode has no error channel.
    pub fn wipe(&self) -> VaultResult<()> {
        let files_dir = self.vault_root.join("files");
        if files_dir.exists() {
            if let Ok(entries) = std::fs::read_dir(&files_dir) {
                for entry in entries.flatten() {
                    let _ = secure_delete(&entry.path());
                }
            }
            let _ = std::fs::remove_dir_all(&files_dir);
        }

        if let Ok(entries) = std::fs::read_dir(&self.vault_root) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name == "metadata.enc"
                    || name.starts_with("metadata.backup.")
                    || name.starts_with("metadata.corrupt.")
                    || name == "config.enc"
                    || name.ends_with(".lock")
                {
                    let _ = secure_delete(&entry.path());
                }
            }
        }

        let backups_dir = self.vault_root.join("backups");
        if backups_dir.exists() {
            if let Ok(entries) = std::fs::read_dir(&backups_dir) {
                for entry in entries.flatten() {
                    let _ = std::fs::remove_dir_all(entry.path());
                }
            }
            let _ = std::fs::remove_dir_all(&backups_dir);
        }

        let _ = std::fs::remove_dir(&self.vault_root);

        Ok(())
    }

    /// Wipes the vault and terminates the process with an exit code
    /// indistinguishable from a normal quit. Never returns.
    pub fn execute_and_exit(&self) -> ! {
        let _ = self.wipe();
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_removes_files_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("files")).unwrap();
        std::fs::write(root.join("files").join("a.enc"), b"ciphertext").unwrap();
        std::fs::write(root.join("metadata.enc"), b"ciphertext").unwrap();
        std::fs::write(root.join("config.enc"), b"ciphertext").unwrap();

        PanicExecutor::new(root.clone()).wipe().unwrap();

        assert!(!root.join("files").exists());
        assert!(!root.join("metadata.enc").exists());
        assert!(!root.join("config.enc").exists());
    }

    #[test]
    fn wipe_is_idempotent_on_already_wiped_vault() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nonexistent-vault");
        let executor = PanicExecutor::new(root);

        assert!(executor.wipe().is_ok());
        assert!(executor.wipe().is_ok());
    }
}
