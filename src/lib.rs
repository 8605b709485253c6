//! fotovault: a personal photo library with a background thumbnail
//! pipeline.
//!
//! Photos are ingested from a directory tree, deduplicated by content
//! hash, and catalogued in SQLite. Multi-resolution thumbnails are
//! generated by batch workers that track progress on shared job rows,
//! and user rotation edits bump a per-photo rotation version that
//! keeps every derived artifact consistent.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod scanner;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use scanner::Scanner;
