use std::path::PathBuf;

use thiserror::Error;

pub type QuillResult<T> = Result<T, QuillError>;

#[derive(Debug, Error)]
pub enum QuillError {
    /// The bytes are not a book container at all. Raised before any crypto runs.
    #[error("not a book container: {0}")]
    Format(String),

    #[error("unsupported container version {found} (newest readable: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Wrong password, corrupted ciphertext and tampered header are
    /// indistinguishable and share this variant.
    #[error("cannot open: wrong password or corrupted file")]
    AuthenticationFailure,

    /// Decoding failed after authentication succeeded. Always a bug.
    #[error("payload corrupt after authentication: {0}")]
    PayloadCorrupt(String),

    #[error("document schema error: {0}")]
    Schema(String),

    #[error("another operation is in progress on {}", path.display())]
    ConcurrentAccess { path: PathBuf },

    #[error("backup of {} failed: {source}", path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encryption,

    #[error("randomness source failed")]
    Randomness,

    #[error("operation cancelled before commit")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuillError {
    /// Short machine-readable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            QuillError::Format(_) => "format",
            QuillError::UnsupportedVersion { .. } => "unsupported_version",
            QuillError::AuthenticationFailure => "authentication_failure",
            QuillError::PayloadCorrupt(_) => "payload_corrupt",
            QuillError::Schema(_) => "schema",
            QuillError::ConcurrentAccess { .. } => "concurrent_access",
            QuillError::BackupFailed { .. } => "backup_failed",
            QuillError::KeyDerivation(_) => "key_derivation",
            QuillError::Encryption => "encryption",
            QuillError::Randomness => "randomness",
            QuillError::Cancelled => "cancelled",
            QuillError::Config(_) => "config",
            QuillError::Io(_) => "io",
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, QuillError::AuthenticationFailure)
    }

    /// Message suitable for showing to the person at the keyboard.
    ///
    /// Only an authentication failure gets its own wording (the caller should
    /// re-prompt for the password); every other kind collapses to a generic
    /// message and the specific kind goes to the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            QuillError::AuthenticationFailure => "wrong password or corrupted file",
            QuillError::ConcurrentAccess { .. } => "the book file is busy, try again",
            QuillError::Cancelled => "operation cancelled",
            _ => "cannot read/write book file",
        }
    }
}
