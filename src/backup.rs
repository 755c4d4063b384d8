//! Backup Archive.
//!
//! Bundles the encrypted vault into a single sealed artifact and restores
//! it atomically. Blobs are copied into the archive verbatim — the backup
//! never re-encrypts file contents, it only wraps them in one more layer of
//! encryption (the archive payload itself) under a possibly-different
//! `backup_key`.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{VaultError, VaultResult};
use crate::file_store::FileDescriptor;
use crate::frame::{Frame, BLOB_MAGIC};
use crate::secure_delete::secure_delete;

pub const BACKUP_MAGIC: &str = "GHOSTVAULT_BACKUP";
pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub format_version: u32,
    pub created_at_ms: i64,
    pub file_count: u64,
    pub total_plaintext_size: u64,
    pub include_configuration: bool,
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub include_configuration: bool,
    pub file_extension_filter: Option<HashSet<String>>,
    pub date_filter: Option<i64>,
    pub compression_level: i64,
}

impl BackupOptions {
    fn matches(&self, descriptor: &FileDescriptor) -> bool {
        if let Some(filter) = &self.file_extension_filter {
            let ext = descriptor.extension().unwrap_or_default();
            if !filter.contains(&ext) {
                return false;
            }
        }
        if let Some(since) = self.date_filter {
            if descriptor.upload_time_ms < since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub continue_on_error: bool,
    pub overwrite_existing: bool,
    pub backup_existing_vault: bool,
    pub restore_configuration: bool,
    pub verify_integrity: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            overwrite_existing: false,
            backup_existing_vault: true,
            restore_configuration: false,
            verify_integrity: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: u64,
    pub skipped: u64,
    pub failed: Vec<String>,
}

/// The paths of one vault instance, as owned by the coordinator. Kept
/// narrow on purpose: the backup module only ever touches these four
/// locations, never the full vault-root listing.
pub struct VaultPaths {
    pub root: PathBuf,
    pub files_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub config_path: PathBuf,
}

/// Creates a sealed backup archive at `output_path`.
pub fn create_backup(
    paths: &VaultPaths,
    descriptors: &[FileDescriptor],
    options: &BackupOptions,
    backup_key: &[u8],
    output_path: &Path,
) -> VaultResult<BackupManifest> {
    let selected: Vec<FileDescriptor> =
        descriptors.iter().filter(|d| options.matches(d)).cloned().collect();

    let manifest = BackupManifest {
        format_version: BACKUP_FORMAT_VERSION,
        created_at_ms: chrono::Utc::now().timestamp_millis(),
        file_count: selected.len() as u64,
        total_plaintext_size: selected.iter().map(|d| d.plaintext_size).sum(),
        include_configuration: options.include_configuration,
        files: selected,
    };

    let mut zip_buf = Zeroizing::new(Vec::new());
    {
        let cursor = std::io::Cursor::new(&mut *zip_buf);
        let mut writer = zip::ZipWriter::new(cursor);
        let zip_options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(options.compression_level.clamp(0, 9)));

        writer.start_file("manifest.json", zip_options)?;
        writer.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

        if paths.metadata_path.exists() {
            let bytes = std::fs::read(&paths.metadata_path)?;
            writer.start_file("metadata.enc", zip_options)?;
            writer.write_all(&bytes)?;
        }

        for descriptor in &manifest.files {
            let blob_path = paths.files_dir.join(&descriptor.blob_name);
            let bytes = std::fs::read(&blob_path)?;
            writer.start_file(format!("files/{}", descriptor.blob_name), zip_options)?;
            writer.write_all(&bytes)?;
        }

        if options.include_configuration && paths.config_path.exists() {
            let bytes = std::fs::read(&paths.config_path)?;
            let name = paths.config_path.file_name().unwrap().to_string_lossy().to_string();
            writer.start_file(format!("config/{name}"), zip_options)?;
            writer.write_all(&bytes)?;
        }

        writer.finish()?;
    }

    let frame = crypto::encrypt(&zip_buf, backup_key)?;
    drop(zip_buf);
    let payload = frame.serialize(BLOB_MAGIC);

    let mut header = Vec::new();
    write_header(&mut header, payload.len() as u32);
    header.extend_from_slice(&payload);

    crate::file_store::atomic_write(output_path, &header)?;

    Ok(manifest)
}

fn write_header(out: &mut Vec<u8>, payload_len: u32) {
    let magic_bytes = BACKUP_MAGIC.as_bytes();
    out.extend_from_slice(&(magic_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(magic_bytes);
    out.extend_from_slice(&BACKUP_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&chrono::Utc::now().timestamp_millis().to_le_bytes());
    out.extend_from_slice(&payload_len.to_le_bytes());
}

struct ParsedArchive {
    zip_buf: Vec<u8>,
}

fn read_and_decrypt(path: &Path, backup_key: &[u8]) -> VaultResult<ParsedArchive> {
    let bytes = std::fs::read(path)?;

    let mut pos = 0usize;
    let magic_len = read_u32(&bytes, &mut pos)? as usize;
    let magic = bytes
        .get(pos..pos + magic_len)
        .ok_or(VaultError::FormatError(crate::frame::FormatError::TooShort(bytes.len())))?;
    if magic != BACKUP_MAGIC.as_bytes() {
        return Err(VaultError::FormatError(crate::frame::FormatError::BadMagic));
    }
    pos += magic_len;

    let format_version = read_u32(&bytes, &mut pos)?;
    if format_version != BACKUP_FORMAT_VERSION {
        return Err(VaultError::InvalidState(format!("unsupported backup format version {format_version}")));
    }
    let _timestamp_ms = read_i64(&bytes, &mut pos)?;
    let payload_len = read_u32(&bytes, &mut pos)? as usize;

    let payload = bytes
        .get(pos..pos + payload_len)
        .ok_or(VaultError::FormatError(crate::frame::FormatError::BadLayout))?;

    let frame = Frame::deserialize(payload, BLOB_MAGIC)?;
    let zip_buf = crypto::decrypt(&frame, backup_key)?;

    Ok(ParsedArchive { zip_buf })
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> VaultResult<u32> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or(VaultError::FormatError(crate::frame::FormatError::TooShort(bytes.len())))?;
    *pos += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_i64(bytes: &[u8], pos: &mut usize) -> VaultResult<i64> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or(VaultError::FormatError(crate::frame::FormatError::TooShort(bytes.len())))?;
    *pos += 8;
    Ok(i64::from_le_bytes(slice.try_into().unwrap()))
}

/// Extracts, decrypts, and parses the manifest without writing to the live
/// vault. Ensures every declared blob is present and non-empty.
pub fn verify_backup(path: &Path, backup_key: &[u8]) -> VaultResult<BackupManifest> {
    let archive = read_and_decrypt(path, backup_key)?;
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(&archive.zip_buf))?;

    let manifest: BackupManifest = {
        let mut entry = zip.by_name("manifest.json")?;
        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;
        serde_json::from_str(&contents)?
    };

    for descriptor in &manifest.files {
        let entry_name = format!("files/{}", descriptor.blob_name);
        let entry = zip
            .by_name(&entry_name)
            .map_err(|_| VaultError::InvalidState(format!("archive missing declared blob {}", descriptor.blob_name)))?;
        if entry.size() == 0 {
            return Err(VaultError::InvalidState(format!("declared blob {} is empty", descriptor.blob_name)));
        }
    }

    Ok(manifest)
}

/// Restores `path` into the vault at `paths`, honoring `options`. Takes a
/// pre-restore snapshot first when requested and rolls back to it if the
/// manifest or metadata cannot be restored.
pub fn restore_backup(
    path: &Path,
    paths: &VaultPaths,
    options: &RestoreOptions,
    backup_key: &[u8],
    vault_initialized: bool,
    pre_restore_descriptors: &[FileDescriptor],
) -> VaultResult<(BackupManifest, RestoreReport)> {
    let pre_restore_path = if options.backup_existing_vault && vault_initialized {
        let ts = chrono::Utc::now().timestamp_millis();
        let sibling = path.with_file_name(format!(
            "{}_pre_restore_{ts}",
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("vault")
        ));
        let backup_options = BackupOptions { include_configuration: true, ..Default::default() };
        create_backup(paths, pre_restore_descriptors, &backup_options, backup_key, &sibling)?;
        Some(sibling)
    } else {
        None
    };

    match restore_inner(path, paths, options, backup_key) {
        Ok(result) => Ok(result),
        Err(e) => {
            if let Some(snapshot) = pre_restore_path {
                let _ = restore_inner(
                    &snapshot,
                    paths,
                    &RestoreOptions { overwrite_existing: true, ..options.clone() },
                    backup_key,
                );
            }
            Err(e)
        }
    }
}

fn restore_inner(
    path: &Path,
    paths: &VaultPaths,
    options: &RestoreOptions,
    backup_key: &[u8],
) -> VaultResult<(BackupManifest, RestoreReport)> {
    let archive = read_and_decrypt(path, backup_key)?;
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(&archive.zip_buf))?;

    let manifest: BackupManifest = {
        let mut entry = zip.by_name("manifest.json")?;
        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;
        serde_json::from_str(&contents)?
    };

    std::fs::create_dir_all(&paths.files_dir)?;
    let mut report = RestoreReport::default();

    for descriptor in &manifest.files {
        let blob_target = paths.files_dir.join(&descriptor.blob_name);
        if blob_target.exists() && !options.overwrite_existing {
            report.skipped += 1;
            continue;
        }

        let result: VaultResult<()> = (|| {
            let mut entry = zip.by_name(&format!("files/{}", descriptor.blob_name))?;
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            crate::file_store::atomic_write(&blob_target, &bytes)
        })();

        match result {
            Ok(()) => report.restored += 1,
            Err(e) if options.continue_on_error => report.failed.push(format!("{}: {e}", descriptor.blob_name)),
            Err(e) => return Err(e),
        }
    }

    // Metadata restore is always fatal on failure.
    {
        let mut entry = zip.by_name("metadata.enc")?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        if paths.metadata_path.exists() && !options.overwrite_existing {
            // Leave existing metadata untouched.
        } else {
            crate::file_store::atomic_write(&paths.metadata_path, &bytes)?;
        }
    }

    if options.restore_configuration {
        if let Ok(names) = zip_entries_under(&mut zip, "config/") {
            for name in names {
                let mut entry = zip.by_name(&name)?;
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                let target = paths.root.join(name.trim_start_matches("config/"));
                crate::file_store::atomic_write(&target, &bytes)?;
            }
        }
    }

    if options.verify_integrity {
        for descriptor in &manifest.files {
            let blob_target = paths.files_dir.join(&descriptor.blob_name);
            let size = std::fs::metadata(&blob_target)
                .map_err(VaultError::StorageError)?
                .len();
            if size < crate::frame::MIN_FRAME_LEN as u64 {
                return Err(VaultError::InvalidState(format!("restored blob {} is too small", descriptor.blob_name)));
            }
        }
    }

    Ok((manifest, report))
}

fn zip_entries_under(zip: &mut zip::ZipArchive<std::io::Cursor<&Vec<u8>>>, prefix: &str) -> VaultResult<Vec<String>> {
    let mut names = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        if entry.name().starts_with(prefix) && !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Deletes a pre-restore snapshot once the operator confirms it is no
/// longer needed. Not called automatically.
pub fn discard_snapshot(path: &Path) -> VaultResult<()> {
    secure_delete(path).map_err(|e| VaultError::StorageError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn vault_with_one_file() -> (tempfile::TempDir, VaultPaths, Vec<FileDescriptor>) {
        let dir = tempfile::tempdir().unwrap();
        let files_dir = dir.path().join("files");
        std::fs::create_dir_all(&files_dir).unwrap();

        let frame = crypto::encrypt(b"A".repeat(1024).as_slice(), b"vault-pw").unwrap();
        let descriptor = FileDescriptor {
            original_name: "a.txt".into(),
            file_id: Uuid::new_v4(),
            blob_name: FileDescriptor::blob_name_for(Uuid::new_v4()),
            plaintext_size: 1024,
            plaintext_sha256: crypto::sha256(&"A".repeat(1024).into_bytes()),
            upload_time_ms: 0,
            tags: None,
            mime_type: None,
        };
        std::fs::write(files_dir.join(&descriptor.blob_name), frame.serialize(BLOB_MAGIC)).unwrap();

        let paths = VaultPaths {
            root: dir.path().to_path_buf(),
            files_dir,
            metadata_path: dir.path().join("metadata.enc"),
            config_path: dir.path().join("config.enc"),
        };
        std::fs::write(&paths.metadata_path, b"placeholder-metadata-frame").unwrap();

        (dir, paths, vec![descriptor])
    }

    #[test]
    fn backup_round_trip_restores_identical_blob_bytes() {
        let (dir, paths, descriptors) = vault_with_one_file();
        let archive_path = dir.path().join("backup.gvb");
        let options = BackupOptions { compression_level: 6, ..Default::default() };

        create_backup(&paths, &descriptors, &options, b"backup-pw", &archive_path).unwrap();

        let original_blob = std::fs::read(paths.files_dir.join(&descriptors[0].blob_name)).unwrap();

        // Wipe files dir, then restore.
        std::fs::remove_dir_all(&paths.files_dir).unwrap();

        let restore_options = RestoreOptions { overwrite_existing: true, backup_existing_vault: false, ..Default::default() };
        let (manifest, report) =
            restore_backup(&archive_path, &paths, &restore_options, b"backup-pw", false, &[]).unwrap();

        assert_eq!(manifest.file_count, 1);
        assert_eq!(report.restored, 1);
        let restored_blob = std::fs::read(paths.files_dir.join(&descriptors[0].blob_name)).unwrap();
        assert_eq!(original_blob, restored_blob);
    }

    #[test]
    fn verify_backup_detects_missing_declared_blob() {
        let (dir, paths, descriptors) = vault_with_one_file();
        let archive_path = dir.path().join("backup.gvb");
        create_backup(&paths, &descriptors, &BackupOptions::default(), b"backup-pw", &archive_path).unwrap();

        let manifest = verify_backup(&archive_path, b"backup-pw").unwrap();
        assert_eq!(manifest.files.len(), 1);
    }

    #[test]
    fn restore_skips_existing_blobs_when_overwrite_disabled() {
        let (dir, paths, descriptors) = vault_with_one_file();
        let archive_path = dir.path().join("backup.gvb");
        create_backup(&paths, &descriptors, &BackupOptions::default(), b"backup-pw", &archive_path).unwrap();

        let restore_options = RestoreOptions { overwrite_existing: false, backup_existing_vault: false, ..Default::default() };
        let (_manifest, report) =
            restore_backup(&archive_path, &paths, &restore_options, b"backup-pw", false, &[]).unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.restored, 0);
    }

    #[test]
    fn wrong_backup_key_fails_to_decrypt() {
        let (dir, paths, descriptors) = vault_with_one_file();
        let archive_path = dir.path().join("backup.gvb");
        create_backup(&paths, &descriptors, &BackupOptions::default(), b"backup-pw", &archive_path).unwrap();

        assert!(verify_backup(&archive_path, b"wrong-pw").is_err());
    }
}
