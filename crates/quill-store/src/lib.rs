//! quill-store: putting books on disk
//!
//! - [`DocumentStore`]: synchronous open / save / change-password with atomic
//!   replace, backup rotation and per-path locking
//! - [`AsyncStore`]: the same operations on tokio's blocking pool
//! - [`BookSession`]: an open book with dirty tracking
//! - [`autosave`]: periodic background saves of a session

pub mod autosave;
pub mod backup;
pub mod lock;
pub mod session;
pub mod store;
pub mod worker;

pub use autosave::{AutoSaveEvent, AutoSaveHandle, AutoSaveOptions, SkipReason};
pub use backup::{BackupEntry, BackupManager};
pub use session::BookSession;
pub use store::{DocumentStore, StoreOptions};
pub use worker::AsyncStore;
