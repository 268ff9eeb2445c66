//! Key derivation: password → 256-bit key via PBKDF2-HMAC-SHA256

use pbkdf2::pbkdf2_hmac;
use quill_core::config::MAX_KDF_ITERATIONS;
use quill_core::{QuillError, QuillResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{KEY_SIZE, SALT_SIZE};

/// Iterations used for newly written files unless configured otherwise.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Fixed iteration count of the version 1 format.
pub const LEGACY_ITERATIONS: u32 = 100_000;

/// A 256-bit key derived from a password.
///
/// Zeroized on drop. Never leaves the operation that derived it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a key from `password` and `salt`.
///
/// Deterministic for equal inputs. Only fails on malformed parameters: a salt
/// that is not 16 bytes, or an iteration count of zero or above the ceiling.
/// A wrong password still derives a key; it just won't authenticate.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8],
    iterations: u32,
) -> QuillResult<DerivedKey> {
    if salt.len() != SALT_SIZE {
        return Err(QuillError::KeyDerivation(format!(
            "salt must be {SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }
    if iterations == 0 || iterations > MAX_KDF_ITERATIONS {
        return Err(QuillError::KeyDerivation(format!(
            "iteration count {iterations} outside 1..={MAX_KDF_ITERATIONS}"
        )));
    }

    // derived straight into the zeroizing wrapper
    let mut key = DerivedKey {
        bytes: [0u8; KEY_SIZE],
    };
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key.bytes,
    );
    tracing::debug!(iterations, "derived key");

    Ok(key)
}
