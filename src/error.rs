//! Error taxonomy for the vault core.
//!
//! Every public operation in this crate returns [`VaultResult`]. Nothing in
//! `ghostvault_core` panics on bad input or swallows an error: the File
//! Store, Metadata Store and codec surface errors immediately, and the
//! coordinator is the boundary that classifies them but never downgrades an
//! `IntegrityFailed` or `UnrecoverableMetadata` into a softer variant.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    /// GCM tag mismatch, or no password-verifier matched. Deliberately
    /// indistinguishable from tampering.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// SHA-256 of retrieved plaintext does not match the stored descriptor.
    #[error("integrity check failed for {0}")]
    IntegrityFailed(String),

    /// Magic or length mismatch on a frame or archive header.
    #[error("format error: {0}")]
    FormatError(#[from] crate::frame::FormatError),

    /// All metadata backups exhausted; requires manual intervention.
    #[error("metadata unrecoverable: all backups exhausted")]
    UnrecoverableMetadata,

    /// I/O failure, propagated with its cause.
    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// Primitive failure unrelated to authentication (KDF/RNG failure).
    #[error("crypto error: {0}")]
    CryptoError(String),

    /// Too many recent INVALID attempts; transient, retry after expiry.
    #[error("locked out for another {remaining_secs}s")]
    Locked { remaining_secs: u64 },

    /// Operation requires an active master session.
    #[error("vault is not initialized or no active master session")]
    NotInitialized,

    /// Requested file id is not present in the registry.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization of internal structures failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A vault was asked to initialize over an already-initialized root,
    /// or vice versa.
    #[error("invalid vault state: {0}")]
    InvalidState(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

impl From<bincode::Error> for VaultError {
    fn from(e: bincode::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<zip::result::ZipError> for VaultError {
    fn from(e: zip::result::ZipError) -> Self {
        VaultError::StorageError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}
