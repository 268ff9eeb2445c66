//! Async front for [`DocumentStore`]: every call runs on tokio's blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use quill_container::ContainerInfo;
use quill_core::{Document, QuillError, QuillResult};
use secrecy::SecretString;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct AsyncStore {
    inner: Arc<DocumentStore>,
}

impl From<DocumentStore> for AsyncStore {
    fn from(store: DocumentStore) -> Self {
        Self::new(Arc::new(store))
    }
}

impl AsyncStore {
    pub fn new(inner: Arc<DocumentStore>) -> Self {
        Self { inner }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.inner
    }

    pub async fn open(&self, path: PathBuf, password: SecretString) -> QuillResult<Document> {
        let store = self.inner.clone();
        run(move || store.open(&path, &password)).await
    }

    /// Save and hand the document back with its updated `modified` stamp.
    pub async fn save(
        &self,
        path: PathBuf,
        document: Document,
        password: SecretString,
    ) -> QuillResult<Document> {
        self.save_with_cancel(path, document, password, CancellationToken::new())
            .await
    }

    pub async fn save_with_cancel(
        &self,
        path: PathBuf,
        mut document: Document,
        password: SecretString,
        cancel: CancellationToken,
    ) -> QuillResult<Document> {
        let store = self.inner.clone();
        run(move || {
            store.save_with_cancel(&path, &mut document, &password, &cancel)?;
            Ok(document)
        })
        .await
    }

    pub async fn change_password(
        &self,
        path: PathBuf,
        old: SecretString,
        new: SecretString,
    ) -> QuillResult<()> {
        let store = self.inner.clone();
        run(move || store.change_password(&path, &old, &new)).await
    }

    pub async fn inspect(&self, path: PathBuf) -> QuillResult<ContainerInfo> {
        let store = self.inner.clone();
        run(move || store.inspect(&path)).await
    }
}

async fn run<T, F>(f: F) -> QuillResult<T>
where
    F: FnOnce() -> QuillResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(join_failed)?
}

fn join_failed(e: JoinError) -> QuillError {
    if e.is_cancelled() {
        return QuillError::Cancelled;
    }
    tracing::error!(error = %e, "store worker panicked");
    QuillError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("store worker failed: {e}"),
    ))
}
