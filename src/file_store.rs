//! File Store and the [`FileDescriptor`] record.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto;
use crate::error::{VaultError, VaultResult};
use crate::frame::{Frame, BLOB_MAGIC};
use crate::secure_delete::secure_delete;

/// In-memory record for one blob: name, id, hash, size, times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDescriptor {
    pub original_name: String,
    pub file_id: Uuid,
    pub blob_name: String,
    pub plaintext_size: u64,
    pub plaintext_sha256: [u8; 32],
    pub upload_time_ms: i64,
    pub tags: Option<String>,
    pub mime_type: Option<String>,
}

impl FileDescriptor {
    pub fn blob_name_for(file_id: Uuid) -> String {
        format!("{file_id}.enc")
    }

    /// Lowercased file extension, used by search/backup filters.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// UUID-keyed on-disk blob store. Exclusively owns everything under
/// `<vault_root>/files/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    files_dir: PathBuf,
}

impl FileStore {
    pub fn new(files_dir: PathBuf) -> VaultResult<Self> {
        std::fs::create_dir_all(&files_dir)?;
        Ok(Self { files_dir })
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn blob_path(&self, blob_name: &str) -> PathBuf {
        self.files_dir.join(blob_name)
    }

    /// Encrypts `plaintext`, frames it, and writes it atomically under a
    /// fresh UUID. Returns the descriptor; the caller registers it with the
    /// metadata store.
    pub fn store(&self, plaintext: &[u8], original_name: &str, password: &[u8]) -> VaultResult<FileDescriptor> {
        let file_id = Uuid::new_v4();
        let plaintext_sha256 = crypto::sha256(plaintext);
        let blob_name = FileDescriptor::blob_name_for(file_id);

        let frame = crypto::encrypt(plaintext, password)?;
        atomic_write(&self.blob_path(&blob_name), &frame.serialize(BLOB_MAGIC))?;

        let mime_type = mime_guess::from_path(original_name).first().map(|m| m.to_string());

        Ok(FileDescriptor {
            original_name: original_name.to_string(),
            file_id,
            blob_name,
            plaintext_size: plaintext.len() as u64,
            plaintext_sha256,
            upload_time_ms: chrono::Utc::now().timestamp_millis(),
            tags: None,
            mime_type,
        })
    }

    /// Reads, decrypts, and integrity-checks the blob for `descriptor`.
    /// Zeroizes the plaintext buffer before returning an `IntegrityFailed`
    /// error (the file itself is not deleted — the caller decides).
    pub fn retrieve(&self, descriptor: &FileDescriptor, password: &[u8]) -> VaultResult<Vec<u8>> {
        let path = self.blob_path(&descriptor.blob_name);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(descriptor.file_id.to_string())
            } else {
                VaultError::StorageError(e)
            }
        })?;

        let frame = Frame::deserialize(&bytes, BLOB_MAGIC)?;
        let mut plaintext = crypto::decrypt(&frame, password)?;

        let actual = crypto::sha256(&plaintext);
        if actual != descriptor.plaintext_sha256 {
            crypto::zeroize(&mut plaintext);
            return Err(VaultError::IntegrityFailed(descriptor.file_id.to_string()));
        }

        Ok(plaintext)
    }

    /// Same as [`Self::retrieve`] but discards the plaintext, used by
    /// metadata integrity checks.
    pub fn verify(&self, descriptor: &FileDescriptor, password: &[u8]) -> VaultResult<bool> {
        match self.retrieve(descriptor, password) {
            Ok(mut plaintext) => {
                crypto::zeroize(&mut plaintext);
                Ok(true)
            }
            Err(VaultError::IntegrityFailed(_)) | Err(VaultError::AuthenticationFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Retrieves and writes the plaintext to `destination_path`, zeroizing
    /// the intermediate buffer afterward.
    pub fn export(&self, descriptor: &FileDescriptor, destination_path: &Path, password: &[u8]) -> VaultResult<()> {
        let mut plaintext = self.retrieve(descriptor, password)?;
        let result = std::fs::write(destination_path, &plaintext);
        crypto::zeroize(&mut plaintext);
        result.map_err(VaultError::StorageError)
    }

    /// Securely deletes the blob. Missing file is not an error.
    pub fn delete(&self, descriptor: &FileDescriptor) -> VaultResult<()> {
        secure_delete(&self.blob_path(&descriptor.blob_name))
            .map_err(|e| VaultError::StorageError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

/// Atomic write: write to `<path>.tmp`, fsync, rename. A crash mid-write
/// never produces a half-frame that would later fail MAGIC.
pub fn atomic_write(path: &Path, data: &[u8]) -> VaultResult<()> {
    let dir = path.parent().ok_or_else(|| VaultError::InvalidState("path has no parent directory".into()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| VaultError::StorageError(e.error))?;
    Ok(())
}
