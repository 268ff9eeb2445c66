//! Synchronous book persistence.
//!
//! Save sequence, with the target never partially overwritten:
//!   1. lock the path (in-process registry + advisory lock file)
//!   2. seal the document with a fresh salt and nonce
//!   3. write `.<name>.<unique>.tmp` next to the target, fsync it
//!   4. rotate the current target into the backup set
//!   5. rename the temp file over the target, fsync the directory
//!
//! A cancellation token is checked between stages up to step 5.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use quill_container::{self as container, ContainerInfo, Opened, SealOptions};
use quill_core::{Document, QuillConfig, QuillError, QuillResult};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::backup::{self, BackupEntry, BackupManager};
use crate::lock::{self, PathLock};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub seal: SealOptions,
    pub max_backups: usize,
    /// Extra attempts for transient I/O errors
    pub io_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub io_backoff: Duration,
    pub lock_files: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&QuillConfig::default())
    }
}

impl From<&QuillConfig> for StoreOptions {
    fn from(config: &QuillConfig) -> Self {
        Self {
            seal: SealOptions::from(&config.crypto),
            max_backups: config.store.max_backups,
            io_retries: config.store.io_retries,
            io_backoff: Duration::from_millis(config.store.io_backoff_ms),
            lock_files: config.store.lock_files,
        }
    }
}

#[derive(Debug)]
pub struct DocumentStore {
    opts: StoreOptions,
    backups: BackupManager,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl DocumentStore {
    pub fn new(opts: StoreOptions) -> Self {
        let backups = BackupManager::new(opts.max_backups);
        Self { opts, backups }
    }

    pub fn from_config(config: &QuillConfig) -> Self {
        Self::new(StoreOptions::from(config))
    }

    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Decrypt the book at `path`.
    pub fn open(&self, path: &Path, password: &SecretString) -> QuillResult<Document> {
        self.open_container(path, password).map(|opened| opened.document)
    }

    /// Like [`DocumentStore::open`], also reporting the stored format version.
    pub fn open_container(&self, path: &Path, password: &SecretString) -> QuillResult<Opened> {
        let _lock = self.lock(path)?;
        let bytes = self.read(path)?;
        let opened = container::open(&bytes, password).map_err(|e| log_failure(path, "open", e))?;
        tracing::info!(
            path = %path.display(),
            version = opened.version.number(),
            chapters = opened.document.chapters.len(),
            "book opened"
        );
        Ok(opened)
    }

    /// Seal and atomically write `doc`, bumping its `modified` timestamp.
    pub fn save(&self, path: &Path, doc: &mut Document, password: &SecretString) -> QuillResult<()> {
        self.save_with_cancel(path, doc, password, &CancellationToken::new())
    }

    pub fn save_with_cancel(
        &self,
        path: &Path,
        doc: &mut Document,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> QuillResult<()> {
        let lock = self.lock(path)?;
        checkpoint(cancel)?;

        // the caller keeps its old stamp if nothing reaches disk
        let previous = doc.modified;
        doc.touch();
        let result = container::seal(doc, password, &self.opts.seal)
            .and_then(|bytes| self.commit(&lock, path, &bytes, cancel).map(|()| bytes.len()));
        let bytes = match result {
            Ok(len) => len,
            Err(e) => {
                doc.modified = previous;
                return Err(log_failure(path, "save", e));
            }
        };

        tracing::info!(path = %path.display(), bytes, "book saved");
        Ok(())
    }

    /// Re-encrypt the book under `new`. The old password must open it first;
    /// otherwise the file is left untouched.
    pub fn change_password(
        &self,
        path: &Path,
        old: &SecretString,
        new: &SecretString,
    ) -> QuillResult<()> {
        self.change_password_with_cancel(path, old, new, &CancellationToken::new())
    }

    pub fn change_password_with_cancel(
        &self,
        path: &Path,
        old: &SecretString,
        new: &SecretString,
        cancel: &CancellationToken,
    ) -> QuillResult<()> {
        let lock = self.lock(path)?;
        let bytes = self.read(path)?;
        let opened = container::open(&bytes, old)
            .map_err(|e| log_failure(path, "change_password", e))?;
        checkpoint(cancel)?;

        let resealed = container::seal(&opened.document, new, &self.opts.seal)?;
        self.commit(&lock, path, &resealed, cancel)
            .map_err(|e| log_failure(path, "change_password", e))?;

        tracing::info!(path = %path.display(), "password changed");
        Ok(())
    }

    /// Check a password without keeping the document.
    pub fn verify_password(&self, path: &Path, password: &SecretString) -> QuillResult<bool> {
        match self.open_container(path, password) {
            Ok(_) => Ok(true),
            Err(QuillError::AuthenticationFailure) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Header facts, no password needed.
    pub fn inspect(&self, path: &Path) -> QuillResult<ContainerInfo> {
        let bytes = self.read(path)?;
        container::inspect(&bytes)
    }

    /// Backups of `path`, newest first.
    pub fn list_backups(&self, path: &Path) -> QuillResult<Vec<BackupEntry>> {
        self.backups.list(path)
    }

    /// Replace `path` with the contents of `backup`. The current file is
    /// itself rotated into the backup set first.
    pub fn restore_backup(&self, path: &Path, backup: &Path) -> QuillResult<()> {
        let lock = self.lock(path)?;
        let bytes = self.read(backup)?;
        container::unframe(&bytes)?;
        self.commit(&lock, path, &bytes, &CancellationToken::new())
            .map_err(|e| log_failure(path, "restore_backup", e))?;
        tracing::info!(
            path = %path.display(),
            backup = %backup.display(),
            "backup restored"
        );
        Ok(())
    }

    fn lock(&self, path: &Path) -> QuillResult<PathLock> {
        lock::acquire(path, self.opts.lock_files)
    }

    fn read(&self, path: &Path) -> QuillResult<Vec<u8>> {
        Ok(self.retry("read", path, || fs::read(path))?)
    }

    /// Steps 3-5 of the save sequence. The caller holds the path lock, so
    /// any temp file of this book still on disk belongs to a dead save.
    fn commit(
        &self,
        _lock: &PathLock,
        path: &Path,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> QuillResult<()> {
        checkpoint(cancel)?;
        sweep_stale_temps(path);
        let temp = self.write_temp(path, bytes)?;

        let result: QuillResult<()> = (|| {
            checkpoint(cancel)?;
            self.backups.rotate(path)?;
            checkpoint(cancel)?;
            self.retry("rename", path, || fs::rename(&temp, path))?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        sync_parent(path);
        Ok(())
    }

    fn write_temp(&self, path: &Path, bytes: &[u8]) -> QuillResult<PathBuf> {
        Ok(self.retry("write", path, || {
            let temp = temp_path(path);
            write_new_synced(&temp, bytes).map_err(|e| {
                let _ = fs::remove_file(&temp);
                e
            })?;
            Ok(temp)
        })?)
    }

    fn retry<T>(
        &self,
        op: &'static str,
        path: &Path,
        mut f: impl FnMut() -> io::Result<T>,
    ) -> io::Result<T> {
        let mut delay = self.opts.io_backoff;
        let mut attempt = 0;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if is_transient(&e) && attempt < self.opts.io_retries => {
                    attempt += 1;
                    tracing::warn!(
                        op,
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "transient I/O error, retrying"
                    );
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

fn checkpoint(cancel: &CancellationToken) -> QuillResult<()> {
    if cancel.is_cancelled() {
        return Err(QuillError::Cancelled);
    }
    Ok(())
}

fn log_failure(path: &Path, op: &'static str, e: QuillError) -> QuillError {
    match &e {
        QuillError::AuthenticationFailure | QuillError::Cancelled => {
            tracing::info!(path = %path.display(), op, kind = e.kind(), "operation did not complete")
        }
        _ => tracing::warn!(path = %path.display(), op, kind = e.kind(), error = %e, "operation failed"),
    }
    e
}

/// Remove `.<name>.*.tmp` siblings of `path`. Failures only log.
fn sweep_stale_temps(path: &Path) {
    let Some(prefix) = temp_prefix(path) else {
        return;
    };
    let entries = match fs::read_dir(parent_dir(path)) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot scan for stale temp files");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_temp_of(name, &prefix) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => tracing::info!(temp = %entry.path().display(), "removed stale temp file"),
            Err(e) => {
                tracing::warn!(temp = %entry.path().display(), error = %e, "cannot remove stale temp file")
            }
        }
    }
}

fn temp_prefix(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    Some(format!(".{file_name}."))
}

fn is_temp_of(name: &str, prefix: &str) -> bool {
    name.len() > prefix.len() + ".tmp".len() && name.starts_with(prefix) && name.ends_with(".tmp")
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("book");
    parent_dir(path).join(format!(".{file_name}.{}-{nanos}-{n}.tmp", std::process::id()))
}

fn write_new_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut handle = OpenOptions::new().create_new(true).write(true).open(path)?;
    backup::set_owner_only(path)?;
    handle.write_all(bytes)?;
    handle.sync_all()
}

/// The rename already happened; a failed directory sync is reported, not
/// returned.
fn sync_parent(path: &Path) {
    let parent = parent_dir(path);
    if let Err(e) = sync_dir(parent) {
        tracing::warn!(
            path = %path.display(),
            dir = %parent.display(),
            error = %e,
            "directory sync failed after replace"
        );
    }
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    OpenOptions::new().read(true).open(dir)?.sync_all()
}
