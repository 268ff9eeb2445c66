//! OS randomness for salts and nonces.

use quill_core::{QuillError, QuillResult};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::SALT_SIZE;

pub type Salt = [u8; SALT_SIZE];

/// Fill `buf` from the operating system RNG.
pub fn fill_random(buf: &mut [u8]) -> QuillResult<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        tracing::error!(error = %e, "OS random source failed");
        QuillError::Randomness
    })
}

pub fn random_salt() -> QuillResult<Salt> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;
    Ok(salt)
}
