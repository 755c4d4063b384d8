//! Password & Role Dispatcher.
//!
//! Holds three PBKDF2 verifiers (master / decoy / panic), classifies a
//! candidate password in constant time, and enforces a lockout after
//! repeated failures. Ordering and early-exit never leak which role, if
//! any, came close to matching.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::crypto::{self, secure_random};
use crate::error::{VaultError, VaultResult};
use crate::file_store::atomic_write;
use crate::frame::{Frame, METADATA_MAGIC};

pub const MIN_PASSWORD_LEN: usize = 12;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
pub const LOCKOUT_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Decoy,
    Panic,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Verifier {
    salt: [u8; 32],
    hash: [u8; 32],
}

impl Verifier {
    fn for_password(password: &str) -> VaultResult<Self> {
        let salt = secure_random::<32>();
        let hash = hash_with_salt(password, &salt)?;
        Ok(Self { salt, hash })
    }

    fn matches(&self, password: &str) -> VaultResult<bool> {
        let candidate = hash_with_salt(password, &self.salt)?;
        Ok(bool::from(candidate.ct_eq(&self.hash)))
    }
}

fn hash_with_salt(password: &str, salt: &[u8; 32]) -> VaultResult<[u8; 32]> {
    let key = crypto::derive_key(password.as_bytes(), salt)?;
    Ok(crypto::sha256(&key.0))
}

/// On-disk, unencrypted (framed) verifier set. Possession alone reveals no
/// password: PBKDF2 verifiers are one-way, and the three entries are stored
/// in a fixed, role-blind order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PasswordConfigData {
    master: Verifier,
    decoy: Verifier,
    panic: Verifier,
}

pub struct PasswordConfig {
    path: PathBuf,
    data: PasswordConfigData,
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordPolicyError {
    #[error("password must be at least {MIN_PASSWORD_LEN} characters with mixed character classes")]
    TooWeak,
    #[error("master, decoy, and panic passwords must be pairwise distinct")]
    NotDistinct,
}

fn meets_strength(password: &str) -> bool {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return false;
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    [has_lower, has_upper, has_digit, has_symbol].iter().filter(|&&b| b).count() >= 3
}

impl PasswordConfig {
    /// First-time setup: validates strength and pairwise distinctness, then
    /// persists the three verifiers as a `config.enc` frame.
    pub fn initialize(path: PathBuf, master: &str, decoy: &str, panic: &str) -> VaultResult<Self> {
        if ![master, decoy, panic].iter().all(|p| meets_strength(p)) {
            return Err(VaultError::InvalidState(PasswordPolicyError::TooWeak.to_string()));
        }
        if master == decoy || decoy == panic || master == panic {
            return Err(VaultError::InvalidState(PasswordPolicyError::NotDistinct.to_string()));
        }

        let data = PasswordConfigData {
            master: Verifier::for_password(master)?,
            decoy: Verifier::for_password(decoy)?,
            panic: Verifier::for_password(panic)?,
        };

        let config = Self { path, data };
        config.persist()?;
        Ok(config)
    }

    pub fn load(path: PathBuf) -> VaultResult<Self> {
        let bytes = std::fs::read(&path)?;
        let frame = Frame::deserialize(&bytes, METADATA_MAGIC)?;
        // config.enc is stored as a frame whose "password" is empty: it must
        // be readable without any of the three vault passwords so classify()
        // can test candidates against it before a session exists.
        let plaintext = crypto::decrypt(&frame, b"")?;
        let data: PasswordConfigData = bincode::deserialize(&plaintext)?;
        Ok(Self { path, data })
    }

    fn persist(&self) -> VaultResult<()> {
        let plaintext = bincode::serialize(&self.data)?;
        let frame = crypto::encrypt(&plaintext, b"")?;
        atomic_write(&self.path, &frame.serialize(METADATA_MAGIC))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Tracks consecutive INVALID results and enforces a lockout, extended on
/// further failures while locked.
#[derive(Debug, Default)]
struct Lockout {
    consecutive_failures: u32,
    locked_until: Option<Instant>,
}

impl Lockout {
    fn remaining(&self) -> Option<Duration> {
        self.locked_until.and_then(|until| {
            let now = Instant::now();
            if now < until {
                Some(until - now)
            } else {
                None
            }
        })
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            self.locked_until = Some(Instant::now() + LOCKOUT_DURATION);
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.locked_until = None;
    }
}

/// Classifies candidate passwords against a [`PasswordConfig`] and owns the
/// process-wide lockout counter.
pub struct Dispatcher {
    config: PasswordConfig,
    lockout: Lockout,
}

impl Dispatcher {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config, lockout: Lockout::default() }
    }

    /// Computes PBKDF2 for `candidate` against each role's salt and
    /// constant-time compares against each verifier, always walking all
    /// three regardless of where a match is found, so timing does not leak
    /// which role (if any) matched.
    pub fn classify(&mut self, candidate: &str) -> VaultResult<Role> {
        if let Some(remaining) = self.lockout.remaining() {
            return Err(VaultError::Locked { remaining_secs: remaining.as_secs().max(1) });
        }

        let master_match = self.config.data.master.matches(candidate)?;
        let decoy_match = self.config.data.decoy.matches(candidate)?;
        let panic_match = self.config.data.panic.matches(candidate)?;

        let role = if master_match {
            Role::Master
        } else if decoy_match {
            Role::Decoy
        } else if panic_match {
            Role::Panic
        } else {
            Role::Invalid
        };

        match role {
            Role::Invalid => self.lockout.record_failure(),
            _ => self.lockout.record_success(),
        }

        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "CorrectHorseBattery#9";
    const DECOY: &str = "Meadowlark!42xyz";
    const PANIC: &str = "zzz-wipe-now-77AB";

    fn dispatcher(dir: &Path) -> Dispatcher {
        let config = PasswordConfig::initialize(dir.join("config.enc"), MASTER, DECOY, PANIC).unwrap();
        Dispatcher::new(config)
    }

    #[test]
    fn role_distinguishability() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path());

        assert_eq!(d.classify(MASTER).unwrap(), Role::Master);
        assert_eq!(d.classify(DECOY).unwrap(), Role::Decoy);
        assert_eq!(d.classify(PANIC).unwrap(), Role::Panic);
        assert_eq!(d.classify("not-a-real-password-99").unwrap(), Role::Invalid);
    }

    #[test]
    fn lockout_after_five_consecutive_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path());

        for _ in 0..5 {
            assert_eq!(d.classify("wrong-password-012").unwrap(), Role::Invalid);
        }

        // Sixth attempt, even with the correct master password, is Locked.
        assert!(matches!(d.classify(MASTER), Err(VaultError::Locked { .. })));
    }

    #[test]
    fn successful_auth_resets_failure_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path());

        for _ in 0..4 {
            d.classify("wrong-password-012").unwrap();
        }
        assert_eq!(d.classify(MASTER).unwrap(), Role::Master);

        // Counter reset: four more failures should not yet trigger lockout.
        for _ in 0..4 {
            assert_eq!(d.classify("still-wrong-013").unwrap(), Role::Invalid);
        }
        assert_eq!(d.classify(MASTER).unwrap(), Role::Master);
    }

    #[test]
    fn rejects_weak_or_non_distinct_passwords() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PasswordConfig::initialize(dir.path().join("c1.enc"), "short", DECOY, PANIC).is_err());
        assert!(PasswordConfig::initialize(dir.path().join("c2.enc"), MASTER, MASTER, PANIC).is_err());
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.enc");
        PasswordConfig::initialize(path.clone(), MASTER, DECOY, PANIC).unwrap();

        let loaded = PasswordConfig::load(path).unwrap();
        let mut d = Dispatcher::new(loaded);
        assert_eq!(d.classify(MASTER).unwrap(), Role::Master);
    }
}
