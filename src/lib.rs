//! GhostVault core: an encrypted local file vault.
//!
//! This crate is the data plane only — cryptographic framing, blob storage,
//! metadata persistence, password/role dispatch, panic-wipe, backup
//! archives, and legacy-blob migration. It has no opinion on UI, decoy
//! filler content, or where `<vault_root>` lives by default; those are
//! host concerns (see [`config::VaultLocation`] and the `ghostvault` binary
//! for the thin CLI host built on top of [`coordinator::VaultCoordinator`]).

pub mod auth;
pub mod backup;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod decoy;
pub mod error;
pub mod file_store;
pub mod frame;
pub mod metadata_store;
pub mod migration;
pub mod panic_executor;
pub mod secure_delete;

pub use coordinator::{AuthOutcome, InitPasswords, VaultCoordinator};
pub use error::{VaultError, VaultResult};
pub use file_store::FileDescriptor;
