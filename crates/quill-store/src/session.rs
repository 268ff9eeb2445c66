//! An open book being edited.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quill_core::{Document, QuillResult};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use crate::store::DocumentStore;

/// Path, decrypted document and password of one open book, plus revision
/// counters that tell whether there are unsaved edits.
///
/// Every call to [`BookSession::document_mut`] counts as an edit.
#[derive(Debug)]
pub struct BookSession {
    path: PathBuf,
    document: Document,
    password: SecretString,
    revision: u64,
    saved_revision: u64,
    last_edit: Instant,
}

impl BookSession {
    /// A session for a book that has never been written. Starts dirty.
    pub fn new(path: impl Into<PathBuf>, document: Document, password: SecretString) -> Self {
        Self {
            path: path.into(),
            document,
            password,
            revision: 1,
            saved_revision: 0,
            last_edit: Instant::now(),
        }
    }

    /// Open an existing book. A file in an older format starts dirty so the
    /// next save rewrites it in the current one.
    pub fn open(
        store: &DocumentStore,
        path: impl Into<PathBuf>,
        password: SecretString,
    ) -> QuillResult<Self> {
        let path = path.into();
        let opened = store.open_container(&path, &password)?;
        let revision = u64::from(opened.needs_upgrade());
        Ok(Self {
            path,
            document: opened.document,
            password,
            revision,
            saved_revision: 0,
            last_edit: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access; marks the session dirty.
    pub fn document_mut(&mut self) -> &mut Document {
        self.revision += 1;
        self.last_edit = Instant::now();
        &mut self.document
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn saved_revision(&self) -> u64 {
        self.saved_revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn last_edit(&self) -> Instant {
        self.last_edit
    }

    /// Record that `revision` reached disk. Edits made after the snapshot
    /// keep the session dirty.
    pub fn mark_saved(&mut self, revision: u64) {
        self.saved_revision = self.saved_revision.max(revision);
    }

    /// [`BookSession::mark_saved`] for a save that ran on a snapshot. The
    /// stored `modified` stamp is adopted only if no edit happened meanwhile.
    pub fn record_save(&mut self, revision: u64, modified: DateTime<Utc>) {
        if revision == self.revision {
            self.document.modified = modified;
        }
        self.mark_saved(revision);
    }

    /// Owned copy of everything a background save needs.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            path: self.path.clone(),
            document: self.document.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
            revision: self.revision,
        }
    }

    /// Save in place on the calling thread.
    pub fn save(&mut self, store: &DocumentStore) -> QuillResult<()> {
        let revision = self.revision;
        store.save(&self.path, &mut self.document, &self.password)?;
        self.mark_saved(revision);
        Ok(())
    }

    /// Re-encrypt the file under `new` and keep using it for later saves.
    pub fn change_password(&mut self, store: &DocumentStore, new: SecretString) -> QuillResult<()> {
        store.change_password(&self.path, &self.password, &new)?;
        self.password = new;
        Ok(())
    }
}

/// Detached state for one save.
#[derive(Debug)]
pub struct SessionSnapshot {
    pub path: PathBuf,
    pub document: Document,
    pub password: SecretString,
    pub revision: u64,
}
