//! Cryptographic Primitives.
//!
//! Password-based key derivation (PBKDF2-HMAC-SHA256), authenticated
//! encryption (AES-256-GCM), SHA-256 hashing, and CSPRNG access. Keys live
//! only as long as the session that derived them; every buffer that carries
//! plaintext or key material is zeroized before it goes out of scope.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::Hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};
use crate::frame::{Frame, GCM_TAG_LEN, IV_LEN, SALT_LEN};

/// PBKDF2 iteration count. A compile-time constant, not user-tunable at
/// runtime.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A 32-byte AES-256 key, zeroized on drop. Never serialized.
#[derive(ZeroizeOnDrop)]
pub struct Key(pub [u8; 32]);

impl Key {
    fn as_cipher(&self) -> VaultResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0)
            .map_err(|e| VaultError::CryptoError(format!("failed to build cipher: {e}")))
    }
}

/// Derives a 256-bit key from `password` and `salt` via PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> VaultResult<Key> {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, PBKDF2_ITERATIONS, &mut key)
        .map_err(|e| VaultError::CryptoError(format!("PBKDF2 failed: {e}")))?;
    Ok(Key(key))
}

/// Fills `out` with CSPRNG bytes.
pub fn secure_random<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Encrypts `plaintext` under `password`, generating a fresh salt and IV.
/// Returns a [`Frame`] ready to be written via the blob codec.
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> VaultResult<Frame> {
    let salt: [u8; SALT_LEN] = secure_random();
    let iv: [u8; IV_LEN] = secure_random();

    let key = derive_key(password, &salt)?;
    let cipher = key.as_cipher()?;
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| VaultError::CryptoError("AES-256-GCM encryption failed".into()))?;

    Ok(Frame::new(salt, iv, ciphertext))
}

/// Decrypts a [`Frame`] under `password`. Returns `AuthenticationFailed` if
/// the GCM tag does not verify — the same error for a wrong password or
/// tampered ciphertext, by design.
pub fn decrypt(frame: &Frame, password: &[u8]) -> VaultResult<Vec<u8>> {
    let key = derive_key(password, &frame.salt)?;
    let cipher = key.as_cipher()?;
    let nonce = Nonce::from_slice(&frame.iv);

    cipher
        .decrypt(nonce, frame.ciphertext.as_slice())
        .map_err(|_| VaultError::AuthenticationFailed)
}

/// SHA-256 of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Overwrites `buf` with zero bytes in a way the compiler cannot elide.
pub fn zeroize(buf: &mut [u8]) {
    buf.zeroize();
}

/// Minimum encrypted frame length, re-exported for callers validating
/// archive payloads without importing `frame` directly.
pub const MIN_CIPHERTEXT_LEN: usize = GCM_TAG_LEN;
