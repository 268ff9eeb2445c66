use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuillError, QuillResult};

/// Hard ceiling on PBKDF2 iterations accepted from config or from a file header.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// Top-level configuration (loaded from quill.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    pub crypto: CryptoConfig,
    pub store: StoreConfig,
    pub autosave: AutoSaveConfig,
    pub log: LogConfig,
}

/// Container encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iterations for newly written files (default: 600000)
    pub kdf_iterations: u32,
    /// zstd compression level (default: 3)
    pub zstd_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of backup snapshots retained per book (default: 20)
    pub max_backups: usize,
    /// Retry limit for transient I/O errors
    pub io_retries: u32,
    /// Initial backoff between I/O retries in milliseconds (doubles per attempt)
    pub io_backoff_ms: u64,
    /// Also take an advisory OS lock next to the book file
    pub lock_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    /// Seconds between auto-save ticks (default: 30)
    pub interval_secs: u64,
    /// Defer a tick's save while the last edit is younger than this (0 = off)
    pub quiet_period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: 600_000,
            zstd_level: 3,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_backups: 20,
            io_retries: 3,
            io_backoff_ms: 50,
            lock_files: true,
        }
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            quiet_period_secs: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl QuillConfig {
    /// Read and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> QuillResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: QuillConfig = toml::from_str(&content)
            .map_err(|e| QuillError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QuillResult<()> {
        if self.crypto.kdf_iterations == 0 || self.crypto.kdf_iterations > MAX_KDF_ITERATIONS {
            return Err(QuillError::Config(format!(
                "crypto.kdf_iterations must be in 1..={MAX_KDF_ITERATIONS}, got {}",
                self.crypto.kdf_iterations
            )));
        }
        if !(1..=22).contains(&self.crypto.zstd_level) {
            return Err(QuillError::Config(format!(
                "crypto.zstd_level must be in 1..=22, got {}",
                self.crypto.zstd_level
            )));
        }
        if self.autosave.interval_secs == 0 {
            return Err(QuillError::Config(
                "autosave.interval_secs must be at least 1".into(),
            ));
        }
        match self.log.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(QuillError::Config(format!(
                "log.format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}
