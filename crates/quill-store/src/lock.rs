//! One operation per book path at a time.
//!
//! Two layers: a process-wide registry of normalized paths, and optionally an
//! advisory `fs2` lock on a sibling `.<name>.lock` file so other processes are
//! excluded too. Both are released when the [`PathLock`] drops.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use fs2::FileExt;
use quill_core::{QuillError, QuillResult};

fn registry() -> &'static Mutex<HashSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Held for the duration of one store operation.
#[derive(Debug)]
pub struct PathLock {
    key: PathBuf,
    _lock_file: Option<File>,
}

impl PathLock {
    /// The normalized path this lock covers.
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let mut held = registry().lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
    }
}

/// Try to take the lock for `path`. Never blocks: contention is
/// [`QuillError::ConcurrentAccess`].
pub fn acquire(path: &Path, os_lock: bool) -> QuillResult<PathLock> {
    let key = normalize(path)?;

    {
        let mut held = registry().lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            tracing::warn!(path = %key.display(), "path already locked in this process");
            return Err(QuillError::ConcurrentAccess { path: key });
        }
    }

    // From here on, dropping `guard` releases the registry entry.
    let mut guard = PathLock {
        key,
        _lock_file: None,
    };

    if os_lock {
        let lock_path = lock_file_path(&guard.key);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => guard._lock_file = Some(file),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                tracing::warn!(path = %guard.key.display(), "path locked by another process");
                return Err(QuillError::ConcurrentAccess {
                    path: guard.key.clone(),
                });
            }
            Err(e) => return Err(QuillError::Io(e)),
        }
    }

    Ok(guard)
}

/// Sibling lock file: `<dir>/.<name>.lock`
pub fn lock_file_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("book");
    path.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.lock"))
}

/// Canonical parent + file name. The file itself may not exist yet.
fn normalize(path: &Path) -> QuillResult<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        QuillError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        ))
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(parent.canonicalize()?.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_concurrent_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");

        let first = acquire(&path, true).unwrap();
        let err = acquire(&path, true).unwrap_err();
        assert!(matches!(err, QuillError::ConcurrentAccess { .. }));

        drop(first);
        acquire(&path, true).unwrap();
    }

    #[test]
    fn test_equivalent_spellings_share_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let direct = dir.path().join("b.book");
        let dotted = dir.path().join("sub").join("..").join("b.book");

        let _held = acquire(&direct, false).unwrap();
        assert!(matches!(
            acquire(&dotted, false),
            Err(QuillError::ConcurrentAccess { .. })
        ));
    }

    #[test]
    fn test_os_lock_excludes_other_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.book");
        let lock_path = lock_file_path(&path);

        let other = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .unwrap();
        other.try_lock_exclusive().unwrap();

        let err = acquire(&path, true).unwrap_err();
        assert!(matches!(err, QuillError::ConcurrentAccess { .. }));

        // registry entry must not leak after an OS-level refusal
        FileExt::unlock(&other).unwrap();
        acquire(&path, true).unwrap();
    }

    #[test]
    fn test_lock_file_name() {
        assert_eq!(
            lock_file_path(Path::new("/books/dune.book")),
            PathBuf::from("/books/.dune.book.lock")
        );
    }
}
