#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use quill_container::SealOptions;
use quill_core::Document;
use quill_store::{DocumentStore, StoreOptions};

/// Store with a tiny KDF work factor so tests stay fast.
pub fn fast_store(max_backups: usize) -> DocumentStore {
    DocumentStore::new(fast_options(max_backups))
}

pub fn fast_options(max_backups: usize) -> StoreOptions {
    StoreOptions {
        seal: SealOptions {
            iterations: 2,
            zstd_level: 1,
        },
        max_backups,
        io_retries: 1,
        io_backoff: Duration::from_millis(1),
        lock_files: true,
    }
}

/// Slow enough that a save is still running when the next request lands.
pub fn slow_store() -> DocumentStore {
    let mut opts = fast_options(5);
    opts.seal.iterations = 50_000;
    DocumentStore::new(opts)
}

pub fn dune() -> Document {
    let mut doc = Document::new("Dune", "FH");
    doc.add_chapter("Ch1", "It began...");
    doc
}

/// Names of hidden temp files left in `dir`.
pub fn temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}
