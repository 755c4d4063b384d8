//! End-to-end scenario tests driving [`VaultCoordinator`]
//! the way a host application would: one process, one vault root,
//! authenticate then act.

use ghostvault_core::backup::{BackupOptions, RestoreOptions};
use ghostvault_core::coordinator::{AuthOutcome, InitPasswords, VaultCoordinator};
use ghostvault_core::VaultError;

const MASTER: &str = "CorrectHorseBattery#9";
const DECOY: &str = "Meadowlark!42xyz";
const PANIC: &str = "zzz-wipe-now-77AB";

fn init(root: &std::path::Path) -> VaultCoordinator {
    VaultCoordinator::init(root.to_path_buf(), InitPasswords { master: MASTER, decoy: DECOY, panic: PANIC }).unwrap()
}

#[test]
fn s1_upload_and_retrieve() {
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = init(dir.path());
    coordinator.authenticate(MASTER).unwrap();

    let data = b"A".repeat(1024);
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, &data).unwrap();

    let id = coordinator.upload(&path).unwrap();
    assert_eq!(coordinator.list().unwrap().len(), 1);

    let retrieved = coordinator.retrieve(id).unwrap();
    assert_eq!(retrieved, data);
}

#[test]
fn s2_wrong_password_denies_access_without_lockout() {
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = init(dir.path());
    coordinator.authenticate(MASTER).unwrap();
    coordinator.logout();

    let outcome = coordinator.authenticate("CorrectHorseBattery#8").unwrap();
    assert_eq!(outcome, AuthOutcome::Invalid);
    assert!(matches!(coordinator.list(), Err(VaultError::NotInitialized)));
}

#[test]
fn s3_lockout_after_five_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = init(dir.path());

    for _ in 0..5 {
        coordinator.authenticate("still-wrong-password").unwrap();
    }

    assert!(matches!(coordinator.authenticate(MASTER), Err(VaultError::Locked { .. })));
}

#[test]
fn s4_backup_and_restore_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = init(dir.path());
    coordinator.authenticate(MASTER).unwrap();

    let data = b"A".repeat(1024);
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, &data).unwrap();
    let id = coordinator.upload(&path).unwrap();

    let archive_path = dir.path().join("v.gvb");
    coordinator.create_backup(&archive_path, &BackupOptions::default(), b"archive-pw").unwrap();

    // Wipe the files directory, simulating data loss, then restore.
    let files_dir = dir.path().join("files");
    std::fs::remove_dir_all(&files_dir).unwrap();
    std::fs::create_dir_all(&files_dir).unwrap();

    let options = RestoreOptions { overwrite_existing: true, backup_existing_vault: false, ..Default::default() };
    coordinator.restore_backup(&archive_path, &options, b"archive-pw").unwrap();

    let retrieved = coordinator.retrieve(id).unwrap();
    assert_eq!(retrieved, data);
}

// S5 (panic password triggers a process exit) can't be driven through
// `authenticate` here — that call never returns for the PANIC role, which
// would kill this whole test binary. `panic_executor::wipe` is the testable
// half of that contract (see its own unit tests); this exercises it against
// a vault built through the coordinator, to confirm the panic path reaches
// everything a real init/upload session creates.
#[test]
fn s5_panic_wipe_clears_a_populated_vault() {
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = init(dir.path());
    coordinator.authenticate(MASTER).unwrap();

    let path = dir.path().join("payload.bin");
    std::fs::write(&path, b"A".repeat(1024)).unwrap();
    coordinator.upload(&path).unwrap();
    drop(coordinator);

    ghostvault_core::panic_executor::PanicExecutor::new(dir.path().to_path_buf()).wipe().unwrap();

    assert!(!dir.path().join("files").exists());
    assert!(!dir.path().join("metadata.enc").exists());
}

#[test]
fn s6_migration_frames_legacy_blob() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = init(dir.path());

    let legacy_path = dir
        .path()
        .join("files")
        .join("00000000-0000-0000-0000-000000000001.dat");
    std::fs::write(&legacy_path, b"legacy").unwrap();

    let result = coordinator.migration_utility().migrate(MASTER.as_bytes()).unwrap();
    match result {
        ghostvault_core::migration::MigrationResult::Success { migrated, .. } => assert_eq!(migrated, 1),
        other => panic!("expected Success, got {other:?}"),
    }

    let bytes = std::fs::read(&legacy_path).unwrap();
    assert!(ghostvault_core::frame::is_encrypted_frame(&bytes, ghostvault_core::frame::BLOB_MAGIC));

    let frame = ghostvault_core::frame::Frame::deserialize(&bytes, ghostvault_core::frame::BLOB_MAGIC).unwrap();
    let plaintext = ghostvault_core::crypto::decrypt(&frame, MASTER.as_bytes()).unwrap();
    assert_eq!(plaintext, b"legacy");

    let snapshot_root = dir.path().join("backups");
    let found_snapshot = std::fs::read_dir(&snapshot_root)
        .unwrap()
        .any(|entry| entry.unwrap().file_name().to_string_lossy().starts_with("file_migration_backup_"));
    assert!(found_snapshot);
}
