//! quill-crypto: password-based encryption for book containers
//!
//! Pipeline for one save:
//! ```text
//! password + fresh salt ──PBKDF2-HMAC-SHA256──▶ 256-bit key
//! key + fresh nonce + header (AAD) ──AES-256-GCM──▶ ciphertext || tag
//! ```
//!
//! Salts and nonces come from the OS RNG on every seal. The cipher draws the
//! nonce itself; callers only ever see it after the fact.

pub mod aead;
pub mod kdf;
pub mod random;

pub use aead::{open, seal_with_fresh_nonce, Nonce, Sealed};
pub use kdf::{derive_key, DerivedKey, DEFAULT_ITERATIONS, LEGACY_ITERATIONS};
pub use random::{random_salt, Salt};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
