//! Host-side vault location resolution.
//!
//! The core library itself never reads environment variables or config
//! files — every constructor takes `<vault_root>` explicitly.
//! This module is the one piece of configuration-file-style plumbing the
//! core still carries: it is consumed only by the CLI binary to decide
//! where `<vault_root>` lives by default, using the `dirs` crate and
//! creating the directory if it is missing.

use std::path::PathBuf;

use crate::error::{VaultError, VaultResult};

/// Resolves the directory that holds one vault's on-disk state.
pub struct VaultLocation;

impl VaultLocation {
    /// Returns `custom` if given, otherwise the platform default data
    /// directory joined with `ghostvault`. Creates the directory if it does
    /// not yet exist; does not otherwise inspect its contents.
    pub fn resolve(custom: Option<PathBuf>) -> VaultResult<PathBuf> {
        let root = match custom {
            Some(path) => path,
            None => Self::default_root()?,
        };

        std::fs::create_dir_all(&root)?;
        Ok(root)
    }

    fn default_root() -> VaultResult<PathBuf> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| {
            VaultError::InvalidState("could not determine local data directory".into())
        })?;
        Ok(data_dir.join("ghostvault").join("vault"))
    }
}
