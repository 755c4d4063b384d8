//! Secure Deletion.
//!
//! Three-pass DoD-5220.22-M-style overwrite (0x00, 0xFF, CSPRNG) with fsync
//! between passes, then unlink. On SSDs the guarantee is best-effort — wear
//! leveling means the physical cells overwritten may not be the ones that
//! held the original data. The contract here is "attempt the overwrite
//! before unlinking," not "prove the bytes are gone."

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

use crate::crypto::secure_random;

const PASS_BUFFER_LEN: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("failed to open {path} for secure delete: {source}")]
    OpenFailed { path: String, #[source] source: std::io::Error },
    #[error("failed to flush/fsync during pass {pass}: {source}")]
    FlushFailed { pass: u8, #[source] source: std::io::Error },
    #[error("failed to remove {path} after overwrite: {source}")]
    UnlinkFailed { path: String, #[source] source: std::io::Error },
}

/// Securely deletes the file at `path`. No-op success if it does not exist.
pub fn secure_delete(path: &Path) -> Result<(), DeleteError> {
    if !path.exists() {
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| DeleteError::OpenFailed { path: path.display().to_string(), source })?;

    let size = file
        .metadata()
        .map_err(|source| DeleteError::OpenFailed { path: path.display().to_string(), source })?
        .len();

    let chunk_count = size.div_ceil(PASS_BUFFER_LEN as u64) as usize;

    overwrite_pass(&mut file, chunk_count, Pattern::Zero)?;
    overwrite_pass(&mut file, chunk_count, Pattern::Ones)?;
    overwrite_pass(&mut file, chunk_count, Pattern::Random)?;

    drop(file);
    std::fs::remove_file(path)
        .map_err(|source| DeleteError::UnlinkFailed { path: path.display().to_string(), source })?;

    Ok(())
}

enum Pattern {
    Zero,
    Ones,
    Random,
}

/// Writes `chunk_count` buffers of `PASS_BUFFER_LEN` bytes each, then
/// flushes and fsyncs. A fsync failure is surfaced but does not abort the
/// remaining passes.
fn overwrite_pass(file: &mut std::fs::File, chunk_count: usize, pattern: Pattern) -> Result<(), DeleteError> {
    file.seek(SeekFrom::Start(0)).map_err(|source| DeleteError::FlushFailed { pass: pattern_number(&pattern), source })?;

    for _ in 0..chunk_count {
        let buf = match pattern {
            Pattern::Zero => [0x00u8; PASS_BUFFER_LEN],
            Pattern::Ones => [0xFFu8; PASS_BUFFER_LEN],
            Pattern::Random => secure_random::<PASS_BUFFER_LEN>(),
        };
        file.write_all(&buf)
            .map_err(|source| DeleteError::FlushFailed { pass: pattern_number(&pattern), source })?;
    }

    file.flush().map_err(|source| DeleteError::FlushFailed { pass: pattern_number(&pattern), source })?;
    file.sync_all().map_err(|source| DeleteError::FlushFailed { pass: pattern_number(&pattern), source })?;
    Ok(())
}

fn pattern_number(pattern: &Pattern) -> u8 {
    match pattern {
        Pattern::Zero => 1,
        Pattern::Ones => 2,
        Pattern::Random => 3,
    }
}
