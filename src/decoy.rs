//! Decoy content collaborator.
//!
//! The decoy-content generator itself is explicitly out of scope for the
//! core — it is "an opaque plausible filler producer." This module models
//! only the seam the coordinator needs to enforce decoy-mode isolation: a
//! trait a front-end implements with real filler content, plus a trivial
//! default so the crate builds and runs standalone.

use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::file_store::FileDescriptor;

/// Supplies the listing and content shown while the vault is unlocked with
/// the decoy password. Implementations must never read from the real file
/// store or metadata store.
pub trait DecoyContentProvider: Send + Sync {
    fn list(&self) -> Vec<FileDescriptor>;
    fn retrieve(&self, file_id: Uuid) -> VaultResult<Vec<u8>>;
}

/// Default provider: an empty, plausible-looking vault. A real front-end
/// supplies its own filler content generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDecoyProvider;

impl DecoyContentProvider for EmptyDecoyProvider {
    fn list(&self) -> Vec<FileDescriptor> {
        Vec::new()
    }

    fn retrieve(&self, file_id: Uuid) -> VaultResult<Vec<u8>> {
        Err(VaultError::NotFound(file_id.to_string()))
    }
}
