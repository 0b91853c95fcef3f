//! Storage module
//!
//! Persists archived events into a category-partitioned file tree and
//! keeps the size-history ledger next to it.
//!
//! Layout (root = configured data directory):
//! - `<root>/<kind>/<ts>.json`
//! - `<root>/<kind>/<coin|user>/<ts>.json`
//! - `<root>/candle/<coin>/<interval>/<ts>.json`
//! - `<root>/size_history.json`
//!
//! Nothing here knows about websockets or channels beyond the category
//! key it is handed.

pub mod category;
pub mod engine;
pub mod ledger;
pub mod walk;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use category::CategoryKey;
pub use engine::{SizeSnapshot, StorageEngine, LEDGER_FILE, LOG_DIR};
pub use ledger::SizeRecord;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("creating directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no free file name for {stem} in {dir}")]
    NameExhausted { dir: PathBuf, stem: String },

    #[error("walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("size ledger {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
