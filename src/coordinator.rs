//! Vault Coordinator.
//!
//! Ties authentication to keys and stores, and is the single public
//! contract a front-end or CLI consumes: upload/retrieve/delete/list/search,
//! backup/restore, and the auth/panic dispatch. Holds the only mutable
//! session state in the crate; everything else is a narrow, single-purpose
//! store the coordinator owns.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::auth::{Dispatcher, PasswordConfig, Role};
use crate::backup::{self, BackupManifest, BackupOptions, RestoreOptions, RestoreReport, VaultPaths};
use crate::decoy::{DecoyContentProvider, EmptyDecoyProvider};
use crate::error::{VaultError, VaultResult};
use crate::file_store::{FileDescriptor, FileStore};
use crate::metadata_store::MetadataStore;
use crate::panic_executor::PanicExecutor;

/// What the front-end sees after `authenticate`. `Panic` never
/// surfaces: the process has already terminated by the time this type could
/// be constructed for that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Master,
    Decoy,
    Invalid,
}

enum Session {
    Master { password: Zeroizing<Vec<u8>> },
    Decoy,
}

/// First-time setup input.
pub struct InitPasswords<'a> {
    pub master: &'a str,
    pub decoy: &'a str,
    pub panic: &'a str,
}

pub struct VaultCoordinator {
    vault_root: PathBuf,
    file_store: FileStore,
    metadata: MetadataStore,
    dispatcher: Dispatcher,
    decoy_provider: Box<dyn DecoyContentProvider>,
    session: Option<Session>,
}

fn config_path(vault_root: &Path) -> PathBuf {
    vault_root.join("config.enc")
}

impl VaultCoordinator {
    /// First-time setup: creates the directory layout, initializes the
    /// password dispatcher, and writes an empty metadata file under the
    /// master password.
    pub fn init(vault_root: PathBuf, passwords: InitPasswords<'_>) -> VaultResult<Self> {
        std::fs::create_dir_all(&vault_root)?;
        std::fs::create_dir_all(vault_root.join("files"))?;
        std::fs::create_dir_all(vault_root.join("backups"))?;

        let config = PasswordConfig::initialize(
            config_path(&vault_root),
            passwords.master,
            passwords.decoy,
            passwords.panic,
        )?;

        let file_store = FileStore::new(vault_root.join("files"))?;
        let mut metadata = MetadataStore::new(vault_root.clone())?;
        metadata.save(passwords.master.as_bytes())?;
        metadata.load(passwords.master.as_bytes())?;

        info!(vault_root = %vault_root.display(), "vault initialized");

        Ok(Self {
            vault_root,
            file_store,
            metadata,
            dispatcher: Dispatcher::new(config),
            decoy_provider: Box::new(EmptyDecoyProvider),
            session: None,
        })
    }

    /// Opens an already-initialized vault. No session is active until
    /// [`Self::authenticate`] succeeds.
    pub fn open(vault_root: PathBuf) -> VaultResult<Self> {
        let config = PasswordConfig::load(config_path(&vault_root))?;
        let file_store = FileStore::new(vault_root.join("files"))?;
        let metadata = MetadataStore::new(vault_root.clone())?;

        Ok(Self {
            vault_root,
            file_store,
            metadata,
            dispatcher: Dispatcher::new(config),
            decoy_provider: Box::new(EmptyDecoyProvider),
            session: None,
        })
    }

    /// Swaps in a real filler-content provider for decoy-mode browsing. The
    /// crate ships only [`EmptyDecoyProvider`] by default: the filler
    /// generator itself is out of core scope.
    pub fn set_decoy_provider(&mut self, provider: Box<dyn DecoyContentProvider>) {
        self.decoy_provider = provider;
    }

    /// Classifies `password` and transitions session state accordingly.
    /// `PANIC` never returns: the process is terminated from within this
    /// call.
    pub fn authenticate(&mut self, password: &str) -> VaultResult<AuthOutcome> {
        match self.dispatcher.classify(password)? {
            Role::Master => {
                self.metadata.load(password.as_bytes())?;
                self.session = Some(Session::Master { password: Zeroizing::new(password.as_bytes().to_vec()) });
                info!("master session opened");
                Ok(AuthOutcome::Master)
            }
            Role::Decoy => {
                self.session = Some(Session::Decoy);
                warn!("decoy session opened");
                Ok(AuthOutcome::Decoy)
            }
            Role::Panic => {
                warn!("panic password entered, wiping vault");
                PanicExecutor::new(self.vault_root.clone()).execute_and_exit();
            }
            Role::Invalid => Ok(AuthOutcome::Invalid),
        }
    }

    pub fn logout(&mut self) {
        self.session = None;
        self.metadata.clear();
        info!("session closed");
    }

    fn master_password(&self) -> VaultResult<&[u8]> {
        match &self.session {
            Some(Session::Master { password }) => Ok(password.as_slice()),
            _ => Err(VaultError::NotInitialized),
        }
    }

    // ---- master-gated content operations ----

    pub fn upload(&mut self, path: &Path) -> VaultResult<Uuid> {
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| VaultError::InvalidState("upload path has no file name".into()))?;
        let bytes = std::fs::read(path)?;
        self.upload_bytes(&bytes, &original_name)
    }

    pub fn upload_bytes(&mut self, bytes: &[u8], original_name: &str) -> VaultResult<Uuid> {
        let password = Zeroizing::new(self.master_password()?.to_vec());
        let descriptor = self.file_store.store(bytes, original_name, &password)?;
        let id = descriptor.file_id;
        self.metadata.add(descriptor, &password)?;
        Ok(id)
    }

    pub fn retrieve(&self, file_id: Uuid) -> VaultResult<Vec<u8>> {
        match &self.session {
            Some(Session::Master { password }) => {
                let descriptor = self.metadata.get(file_id).ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
                self.file_store.retrieve(descriptor, password)
            }
            Some(Session::Decoy) => self.decoy_provider.retrieve(file_id),
            None => Err(VaultError::NotInitialized),
        }
    }

    pub fn delete(&mut self, file_id: Uuid) -> VaultResult<()> {
        let password = Zeroizing::new(self.master_password()?.to_vec());
        let descriptor = self.metadata.remove(file_id, &password)?;
        self.file_store.delete(&descriptor)
    }

    pub fn list(&self) -> VaultResult<Vec<FileDescriptor>> {
        match &self.session {
            Some(Session::Master { .. }) => Ok(self.metadata.list().into_iter().cloned().collect()),
            Some(Session::Decoy) => Ok(self.decoy_provider.list()),
            None => Err(VaultError::NotInitialized),
        }
    }

    pub fn search(&self, query: &str) -> VaultResult<Vec<FileDescriptor>> {
        self.master_password()?;
        Ok(self.metadata.search(query).into_iter().cloned().collect())
    }

    pub fn export(&self, file_id: Uuid, destination: &Path) -> VaultResult<()> {
        let password = self.master_password()?;
        let descriptor = self.metadata.get(file_id).ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
        self.file_store.export(descriptor, destination, password)
    }

    pub fn update_tags(&mut self, file_id: Uuid, tags: Option<String>) -> VaultResult<()> {
        let password = Zeroizing::new(self.master_password()?.to_vec());
        self.metadata.update_tags(file_id, tags, &password)
    }

    // ---- backup / restore ----

    fn vault_paths(&self) -> VaultPaths {
        VaultPaths {
            root: self.vault_root.clone(),
            files_dir: self.file_store.files_dir().to_path_buf(),
            metadata_path: self.metadata.primary_path().to_path_buf(),
            config_path: config_path(&self.vault_root),
        }
    }

    pub fn create_backup(
        &self,
        output_path: &Path,
        options: &BackupOptions,
        backup_key: &[u8],
    ) -> VaultResult<BackupManifest> {
        self.master_password()?;
        let descriptors: Vec<FileDescriptor> = self.metadata.list().into_iter().cloned().collect();
        backup::create_backup(&self.vault_paths(), &descriptors, options, backup_key, output_path)
    }

    pub fn verify_backup(&self, path: &Path, backup_key: &[u8]) -> VaultResult<BackupManifest> {
        backup::verify_backup(path, backup_key)
    }

    pub fn restore_backup(
        &mut self,
        path: &Path,
        options: &RestoreOptions,
        backup_key: &[u8],
    ) -> VaultResult<(BackupManifest, RestoreReport)> {
        let password = Zeroizing::new(self.master_password()?.to_vec());
        let vault_initialized = self.metadata.primary_path().exists();
        let pre_restore_descriptors: Vec<FileDescriptor> = self.metadata.list().into_iter().cloned().collect();

        let (manifest, report) = backup::restore_backup(
            path,
            &self.vault_paths(),
            options,
            backup_key,
            vault_initialized,
            &pre_restore_descriptors,
        )?;

        self.metadata.load(&password)?;
        Ok((manifest, report))
    }

    // ---- migration ----

    pub fn migration_utility(&self) -> crate::migration::MigrationUtility {
        crate::migration::MigrationUtility::new(&self.vault_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "CorrectHorseBattery#9";
    const DECOY: &str = "Meadowlark!42xyz";
    const PANIC: &str = "zzz-wipe-now-77AB";

    fn init_coordinator(root: &Path) -> VaultCoordinator {
        VaultCoordinator::init(
            root.to_path_buf(),
            InitPasswords { master: MASTER, decoy: DECOY, panic: PANIC },
        )
        .unwrap()
    }

    #[test]
    fn s1_upload_and_retrieve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = init_coordinator(dir.path());

        assert_eq!(coordinator.authenticate(MASTER).unwrap(), AuthOutcome::Master);

        let data = b"A".repeat(1024);
        let file_path = dir.path().join("upload.bin");
        std::fs::write(&file_path, &data).unwrap();

        let id = coordinator.upload(&file_path).unwrap();
        assert_eq!(coordinator.list().unwrap().len(), 1);

        let retrieved = coordinator.retrieve(id).unwrap();
        assert_eq!(retrieved, data);

        let descriptor = coordinator.metadata.get(id).unwrap();
        assert_eq!(descriptor.plaintext_size, 1024);
    }

    #[test]
    fn s2_wrong_password_is_invalid_and_gates_access() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = init_coordinator(dir.path());

        assert_eq!(coordinator.authenticate("CorrectHorseBattery#8").unwrap(), AuthOutcome::Invalid);
        assert!(matches!(coordinator.list(), Err(VaultError::NotInitialized)));
    }

    #[test]
    fn s3_lockout_after_five_invalid_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = init_coordinator(dir.path());

        for _ in 0..5 {
            coordinator.authenticate("nope-nope-nope-0").unwrap();
        }

        assert!(matches!(coordinator.authenticate(MASTER), Err(VaultError::Locked { .. })));
    }

    #[test]
    fn decoy_mode_never_exposes_real_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = init_coordinator(dir.path());

        coordinator.authenticate(MASTER).unwrap();
        let file_path = dir.path().join("real.txt");
        std::fs::write(&file_path, b"real secret").unwrap();
        coordinator.upload(&file_path).unwrap();
        coordinator.logout();

        assert_eq!(coordinator.authenticate(DECOY).unwrap(), AuthOutcome::Decoy);
        assert!(coordinator.list().unwrap().is_empty());
    }

    #[test]
    fn delete_removes_both_descriptor_and_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = init_coordinator(dir.path());
        coordinator.authenticate(MASTER).unwrap();

        let file_path = dir.path().join("f.txt");
        std::fs::write(&file_path, b"bytes").unwrap();
        let id = coordinator.upload(&file_path).unwrap();

        coordinator.delete(id).unwrap();

        assert!(coordinator.list().unwrap().is_empty());
        assert!(matches!(coordinator.retrieve(id), Err(VaultError::NotFound(_))));
    }
}
