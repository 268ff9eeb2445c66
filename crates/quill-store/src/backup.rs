//! Rolling backups of a book file.
//!
//! Layout: `<dir>/<name>.backups/backup-<seq>.book`, `<seq>` zero-padded and
//! strictly increasing, so the highest sequence is the newest snapshot.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quill_core::{QuillError, QuillResult};

const PREFIX: &str = "backup-";
const SUFFIX: &str = ".book";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub seq: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    max_backups: usize,
}

impl BackupManager {
    pub fn new(max_backups: usize) -> Self {
        Self { max_backups }
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Directory holding backups of `path`.
    pub fn backup_dir(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("book");
        path.parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{file_name}.backups"))
    }

    /// Snapshot the current bytes of `path`, then drop snapshots beyond the
    /// retention limit. Returns `None` when there is nothing to back up.
    pub fn rotate(&self, path: &Path) -> QuillResult<Option<PathBuf>> {
        if self.max_backups == 0 || !path.exists() {
            return Ok(None);
        }
        let failed = |source: io::Error| QuillError::BackupFailed {
            path: path.to_path_buf(),
            source,
        };

        let dir = Self::backup_dir(path);
        fs::create_dir_all(&dir).map_err(failed)?;

        let existing = scan(&dir).map_err(failed)?;
        let seq = existing.first().map_or(1, |newest| newest.seq + 1);
        let backup_path = dir.join(format!("{PREFIX}{seq:06}{SUFFIX}"));

        let bytes = fs::read(path).map_err(failed)?;
        write_synced(&backup_path, &bytes).map_err(|e| {
            let _ = fs::remove_file(&backup_path);
            failed(e)
        })?;

        for stale in existing.iter().skip(self.max_backups.saturating_sub(1)) {
            fs::remove_file(&stale.path).map_err(failed)?;
            tracing::debug!(backup = %stale.path.display(), "pruned old backup");
        }

        tracing::info!(
            path = %path.display(),
            backup = %backup_path.display(),
            bytes = bytes.len(),
            "backup rotated"
        );
        Ok(Some(backup_path))
    }

    /// Backups of `path`, newest first.
    pub fn list(&self, path: &Path) -> QuillResult<Vec<BackupEntry>> {
        let dir = Self::backup_dir(path);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        scan(&dir).map_err(|source| QuillError::BackupFailed {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn scan(dir: &Path) -> io::Result<Vec<BackupEntry>> {
    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(seq) = parse_seq(&path) else {
            continue;
        };
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        backups.push(BackupEntry {
            path,
            seq,
            size: meta.len(),
        });
    }
    backups.sort_by(|a, b| b.seq.cmp(&a.seq));
    Ok(backups)
}

fn parse_seq(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    set_owner_only(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

pub(crate) fn set_owner_only(_path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(_path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
