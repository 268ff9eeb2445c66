//! In-memory save/open chain over complete file images.

use quill_core::config::{CryptoConfig, MAX_KDF_ITERATIONS};
use quill_core::{Document, QuillError, QuillResult};
use quill_crypto::{derive_key, random_salt, seal_with_fresh_nonce, DEFAULT_ITERATIONS};
use secrecy::SecretString;

use crate::compress::{self, Compressor, DEFAULT_LEVEL};
use crate::header::{self, ContainerHeader, FormatVersion};
use crate::{codec, legacy};

/// Tunables for writing a container.
#[derive(Debug, Clone, Copy)]
pub struct SealOptions {
    pub iterations: u32,
    pub zstd_level: i32,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            zstd_level: DEFAULT_LEVEL,
        }
    }
}

impl From<&CryptoConfig> for SealOptions {
    fn from(config: &CryptoConfig) -> Self {
        Self {
            iterations: config.kdf_iterations,
            zstd_level: config.zstd_level,
        }
    }
}

/// Encrypt `doc` into complete version 2 file bytes.
///
/// Salt and nonce are fresh on every call.
pub fn seal(doc: &Document, password: &SecretString, opts: &SealOptions) -> QuillResult<Vec<u8>> {
    let json = codec::serialize(doc)?;
    let packed = Compressor::new(opts.zstd_level).compress(&json)?;

    let salt = random_salt()?;
    let key = derive_key(password, &salt, opts.iterations)?;

    let sealed = seal_with_fresh_nonce(
        &key,
        |nonce| ContainerHeader::current(salt, *nonce, opts.iterations).to_bytes(),
        &packed,
    )?;

    // the AAD is the header, byte for byte
    let mut file = sealed.aad;
    file.extend_from_slice(&sealed.ciphertext);

    tracing::debug!(
        json_bytes = json.len(),
        compressed_bytes = packed.len(),
        file_bytes = file.len(),
        "sealed document"
    );
    Ok(file)
}

/// A decrypted container.
#[derive(Debug)]
pub struct Opened {
    pub document: Document,
    /// Format the bytes were stored in.
    pub version: FormatVersion,
}

impl Opened {
    /// Whether the source was an older format and should be rewritten.
    pub fn needs_upgrade(&self) -> bool {
        self.version != FormatVersion::V2
    }
}

/// Decrypt complete file bytes.
///
/// Errors are, in order of detection: [`QuillError::Format`] /
/// [`QuillError::UnsupportedVersion`] from framing,
/// [`QuillError::AuthenticationFailure`] from the cipher,
/// [`QuillError::PayloadCorrupt`] from decompression and
/// [`QuillError::Schema`] from parsing.
pub fn open(bytes: &[u8], password: &SecretString) -> QuillResult<Opened> {
    let (header, ciphertext) = header::unframe(bytes)?;

    // Every header we write has an in-range count, and the header is
    // authenticated, so an out-of-range count can only come from tampering.
    if header.iterations == 0 || header.iterations > MAX_KDF_ITERATIONS {
        tracing::warn!(
            iterations = header.iterations,
            "header iteration count out of range"
        );
        return Err(QuillError::AuthenticationFailure);
    }

    let key = derive_key(password, &header.salt, header.iterations)?;
    let packed = quill_crypto::open(&key, &header.nonce, &header.aad(), ciphertext)?;
    drop(key);

    let document = match header.version {
        FormatVersion::V2 => {
            let json = Compressor::default().decompress(&packed)?;
            codec::deserialize(&json)?
        }
        FormatVersion::V1 => {
            let json = compress::decompress_zlib(&packed)?;
            let doc = legacy::deserialize(&json)?;
            tracing::info!("read version 1 container, will upgrade on next save");
            doc
        }
    };

    Ok(Opened {
        document,
        version: header.version,
    })
}
