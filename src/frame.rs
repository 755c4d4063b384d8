//! Framed Blob Codec.
//!
//! Serializes `{magic, salt, iv, ciphertext||tag}` to/from bytes and
//! validates layout. Two magic values share one codec: `BLOB_MAGIC` for
//! file-store blobs and `METADATA_MAGIC` for the metadata/config files, so
//! the codec itself prevents a metadata file being read back as a blob or
//! vice versa.

use thiserror::Error;

pub const BLOB_MAGIC: [u8; 4] = *b"GVEF";
pub const METADATA_MAGIC: [u8; 4] = *b"GVMD";

pub const SALT_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

/// 4 (magic) + 32 (salt) + 12 (iv) + 16 (minimum ciphertext+tag).
pub const MIN_FRAME_LEN: usize = 4 + SALT_LEN + IV_LEN + GCM_TAG_LEN;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("frame too short: {0} bytes, minimum is {MIN_FRAME_LEN}")]
    TooShort(usize),
    #[error("bad magic bytes")]
    BadMagic,
    #[error("bad frame layout")]
    BadLayout,
}

/// A decoded frame: salt, IV, and ciphertext (with trailing GCM tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl Frame {
    pub fn new(salt: [u8; SALT_LEN], iv: [u8; IV_LEN], ciphertext: Vec<u8>) -> Self {
        Self { salt, iv, ciphertext }
    }

    /// `magic ‖ salt ‖ iv ‖ ciphertext`. Deterministic given its inputs.
    pub fn serialize(&self, magic: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + SALT_LEN + IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&magic);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decodes a frame, requiring `expected_magic` to match exactly.
    pub fn deserialize(bytes: &[u8], expected_magic: [u8; 4]) -> Result<Self, FormatError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FormatError::TooShort(bytes.len()));
        }
        if bytes[0..4] != expected_magic {
            return Err(FormatError::BadMagic);
        }

        let salt_start = 4;
        let iv_start = salt_start + SALT_LEN;
        let ct_start = iv_start + IV_LEN;

        let ciphertext = &bytes[ct_start..];
        if ciphertext.len() < GCM_TAG_LEN {
            return Err(FormatError::BadLayout);
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[salt_start..iv_start]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[iv_start..ct_start]);

        Ok(Frame { salt, iv, ciphertext: ciphertext.to_vec() })
    }
}

/// Cheap sniff used by the migration utility and load paths that must
/// differentiate legacy plaintext from framed ciphertext. Only returns true
/// for bytes that also pass full validation length checks.
pub fn is_encrypted_frame(bytes: &[u8], expected_magic: [u8; 4]) -> bool {
    Frame::deserialize(bytes, expected_magic).is_ok()
}
