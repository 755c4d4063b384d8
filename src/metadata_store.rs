//! Metadata Store.
//!
//! In-memory registry of file descriptors with encrypted persistence,
//! rolling backups, and a recovery ladder that falls back to the newest
//! backup that still decrypts when the primary file is corrupt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{VaultError, VaultResult};
use crate::file_store::{atomic_write, FileDescriptor};
use crate::frame::{Frame, METADATA_MAGIC};
use crate::secure_delete::secure_delete;

/// Bounded number of rolling metadata backups retained for recovery.
pub const BACKUP_RING_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Recovering,
    Unrecoverable,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    files: HashMap<Uuid, FileDescriptor>,
}

/// Advisory exclusive lock for the duration of `save`, taken via a
/// create-new lockfile next to the metadata file. A second process
/// attempting a concurrent save fails fast rather than corrupting state.
struct SaveLock {
    path: PathBuf,
}

impl SaveLock {
    fn acquire(metadata_path: &Path) -> VaultResult<Self> {
        let path = lock_path(metadata_path);
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    VaultError::StorageError(std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        "metadata save already in progress",
                    ))
                } else {
                    VaultError::StorageError(e)
                }
            })?;
        Ok(Self { path })
    }
}

impl Drop for SaveLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_path(metadata_path: &Path) -> PathBuf {
    let mut name = metadata_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

pub struct MetadataStore {
    dir: PathBuf,
    primary_path: PathBuf,
    registry: HashMap<Uuid, FileDescriptor>,
    state: LoadState,
}

impl MetadataStore {
    pub fn new(dir: PathBuf) -> VaultResult<Self> {
        std::fs::create_dir_all(&dir)?;
        let primary_path = dir.join("metadata.enc");
        Ok(Self { dir, primary_path, registry: HashMap::new(), state: LoadState::Unloaded })
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary_path
    }

    /// Clears the in-memory registry without touching anything on disk.
    /// Called on logout so no descriptor data lingers in memory once the
    /// session ends.
    pub fn clear(&mut self) {
        self.registry = HashMap::new();
        self.state = LoadState::Unloaded;
    }

    /// Loads the registry from the primary file, falling back to the
    /// newest-first backup ladder on failure.
    pub fn load(&mut self, password: &[u8]) -> VaultResult<()> {
        self.state = LoadState::Loading;

        if !self.primary_path.exists() {
            self.registry = HashMap::new();
            self.state = LoadState::Loaded;
            return Ok(());
        }

        match self.try_decode(&self.primary_path, password) {
            Ok(registry) => {
                self.registry = registry.files;
                self.state = LoadState::Loaded;
                Ok(())
            }
            Err(_) => {
                self.state = LoadState::Recovering;
                self.recover_from_backups(password)
            }
        }
    }

    fn recover_from_backups(&mut self, password: &[u8]) -> VaultResult<()> {
        let mut backups = self.list_backups()?;
        // Newest first.
        backups.sort_by(|a, b| b.1.cmp(&a.1));

        for (path, _ts) in &backups {
            if let Ok(registry) = self.try_decode(path, password) {
                // Preserve the broken primary for manual inspection.
                if self.primary_path.exists() {
                    let corrupt_path = self.dir.join(format!(
                        "metadata.corrupt.{}",
                        chrono::Utc::now().timestamp_millis()
                    ));
                    let _ = std::fs::copy(&self.primary_path, &corrupt_path);
                }
                self.registry = registry.files;
                self.state = LoadState::Loaded;
                return Ok(());
            }
        }

        self.registry = HashMap::new();
        self.state = LoadState::Unrecoverable;
        Err(VaultError::UnrecoverableMetadata)
    }

    fn try_decode(&self, path: &Path, password: &[u8]) -> VaultResult<Registry> {
        let bytes = std::fs::read(path)?;
        let frame = Frame::deserialize(&bytes, METADATA_MAGIC)?;
        let plaintext = Zeroizing::new(crypto::decrypt(&frame, password)?);
        let registry: Registry = bincode::deserialize(&plaintext)?;
        Ok(registry)
    }

    /// Copies the current primary aside as a timestamped backup (if one
    /// exists), enforces the 5-newest ring policy, serializes the
    /// in-memory registry, encrypts, frames, and atomically writes the
    /// primary. The serialized plaintext is zeroized on every exit path,
    /// including early returns from a failed encrypt, via `Zeroizing`.
    pub fn save(&self, password: &[u8]) -> VaultResult<()> {
        let _lock = SaveLock::acquire(&self.primary_path)?;

        if self.primary_path.exists() {
            let backup_path = self.dir.join(format!(
                "metadata.backup.{}",
                chrono::Utc::now().timestamp_millis()
            ));
            // Best-effort: a failed backup copy does not abort the save.
            let _ = std::fs::copy(&self.primary_path, &backup_path);
        }

        self.enforce_backup_ring()?;

        let registry = Registry { files: self.registry.clone() };
        let plaintext = Zeroizing::new(bincode::serialize(&registry)?);

        let frame = crypto::encrypt(&plaintext, password)?;
        atomic_write(&self.primary_path, &frame.serialize(METADATA_MAGIC))
    }

    fn list_backups(&self) -> VaultResult<Vec<(PathBuf, i64)>> {
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(ts) = name.strip_prefix("metadata.backup.") {
                if let Ok(ts) = ts.parse::<i64>() {
                    backups.push((entry.path(), ts));
                }
            }
        }
        Ok(backups)
    }

    fn enforce_backup_ring(&self) -> VaultResult<()> {
        let mut backups = self.list_backups()?;
        if backups.len() <= BACKUP_RING_SIZE {
            return Ok(());
        }
        backups.sort_by(|a, b| b.1.cmp(&a.1));
        for (path, _ts) in backups.into_iter().skip(BACKUP_RING_SIZE) {
            let _ = secure_delete(&path);
        }
        Ok(())
    }

    // ---- mutations ----

    pub fn add(&mut self, descriptor: FileDescriptor, password: &[u8]) -> VaultResult<()> {
        self.registry.insert(descriptor.file_id, descriptor);
        self.save(password)
    }

    pub fn remove(&mut self, file_id: Uuid, password: &[u8]) -> VaultResult<FileDescriptor> {
        let descriptor = self
            .registry
            .remove(&file_id)
            .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
        self.save(password)?;
        Ok(descriptor)
    }

    pub fn update_tags(&mut self, file_id: Uuid, tags: Option<String>, password: &[u8]) -> VaultResult<()> {
        let descriptor = self
            .registry
            .get_mut(&file_id)
            .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
        descriptor.tags = tags;
        self.save(password)
    }

    // ---- queries ----

    pub fn get(&self, file_id: Uuid) -> Option<&FileDescriptor> {
        self.registry.get(&file_id)
    }

    pub fn list(&self) -> Vec<&FileDescriptor> {
        self.registry.values().collect()
    }

    pub fn search(&self, query: &str) -> Vec<&FileDescriptor> {
        let needle = query.to_lowercase();
        self.registry
            .values()
            .filter(|d| {
                d.original_name.to_lowercase().contains(&needle)
                    || d.tags.as_deref().unwrap_or("").to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn get_by_extension(&self, ext: &str) -> Vec<&FileDescriptor> {
        let ext = ext.to_lowercase();
        self.registry.values().filter(|d| d.extension().as_deref() == Some(ext.as_str())).collect()
    }

    pub fn total_size(&self) -> u64 {
        self.registry.values().map(|d| d.plaintext_size).sum()
    }

    pub fn count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> FileDescriptor {
        FileDescriptor {
            original_name: name.to_string(),
            file_id: Uuid::new_v4(),
            blob_name: format!("{name}.enc"),
            plaintext_size: 42,
            plaintext_sha256: [1u8; 32],
            upload_time_ms: 0,
            tags: Some("work".into()),
            mime_type: None,
        }
    }

    #[test]
    fn durability_after_mutation_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        store.load(b"pw").unwrap();

        let descriptor = descriptor("a.txt");
        let id = descriptor.file_id;
        store.add(descriptor, b"pw").unwrap();

        let mut reopened = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        reopened.load(b"pw").unwrap();
        assert_eq!(reopened.list().len(), 1);
        assert!(reopened.get(id).is_some());
    }

    #[test]
    fn recovers_from_backup_when_primary_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        store.load(b"pw").unwrap();
        store.add(descriptor("first.txt"), b"pw").unwrap();
        store.add(descriptor("second.txt"), b"pw").unwrap();

        // Corrupt only the primary; a backup from the first `add` remains.
        std::fs::write(store.primary_path(), b"not a valid frame").unwrap();

        let mut recovered = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        recovered.load(b"pw").unwrap();
        assert_eq!(recovered.state(), LoadState::Loaded);
        assert_eq!(recovered.list().len(), 1);
    }

    #[test]
    fn unrecoverable_when_no_backup_decrypts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("metadata.enc"), b"garbage").unwrap();

        let mut store = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        let result = store.load(b"pw");
        assert!(matches!(result, Err(VaultError::UnrecoverableMetadata)));
        assert_eq!(store.state(), LoadState::Unrecoverable);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn backup_ring_retains_at_most_five() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        store.load(b"pw").unwrap();

        for i in 0..8 {
            store.add(descriptor(&format!("f{i}.txt")), b"pw").unwrap();
            // Ensure distinct millisecond timestamps for backup filenames.
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let backups = store.list_backups().unwrap();
        assert!(backups.len() <= BACKUP_RING_SIZE);
    }

    #[test]
    fn search_is_case_insensitive_over_name_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().to_path_buf()).unwrap();
        store.load(b"pw").unwrap();
        store.add(descriptor("Invoice.PDF"), b"pw").unwrap();

        assert_eq!(store.search("invoice").len(), 1);
        assert_eq!(store.search("WORK").len(), 1);
        assert_eq!(store.search("nope").len(), 0);
    }
}
