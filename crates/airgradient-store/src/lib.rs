//! Archive persistence for averaged AirGradient records.
//!
//! This crate provides an append-only, timestamp-ordered SQLite archive.
//!
//! # Features
//!
//! - Append averaged records, rejecting anything not strictly newer than
//!   the last record
//! - Look up the earliest archived timestamp
//! - Range queries with the `since`/`max`/`limit` boundary rules of
//!   [`ArchiveQuery`]
//!
//! # Example
//!
//! ```no_run
//! use airgradient_store::{ArchiveQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! // Everything after the record the client already has, ten at a time.
//! let records = store.query(&ArchiveQuery::since(1_700_000_000).limit(10))?;
//! # Ok::<(), airgradient_store::Error>(())
//! ```

mod error;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use queries::ArchiveQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airgradient-proxy/archive.sdb`
/// - macOS: `~/Library/Application Support/airgradient-proxy/archive.sdb`
/// - Windows: `C:\Users\<user>\AppData\Local\airgradient-proxy\archive.sdb`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airgradient-proxy")
        .join("archive.sdb")
}
