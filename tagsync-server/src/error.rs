//! Error types for tagsync-server
//!
//! Startup failures are fatal. Per-request faults never reach this type; they
//! are turned into status bytes inside the request handler.

use crate::dataset::DatasetError;
use crate::store::StoreError;
use thiserror::Error;

/// Main error type for tagsync-server
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] tagsync_common::Error),

    /// Data or metadata table unusable
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Output location not writable
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Listener errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using tagsync-server Error
pub type Result<T> = std::result::Result<T, Error>;
