//! Typed errors for the counting storage engine.
//!
//! Everything surfaces to the caller; nothing is swallowed. `add` and
//! `get_count` never fail on well-formed input (a key is always reducible
//! modulo a table size), so only construction, bigcount toggling and
//! save/load return `Result`.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid construction parameters: zero tables, zero-sized tables,
    /// too many nibble tables, shape mismatch on union.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation not implemented by this store type.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Open/read/write failure on the backing file.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Signature / version / type-tag mismatch while loading.
    #[error("{what} mismatch in {path}: expected {expected}, got {actual}")]
    BadFormat {
        what: &'static str,
        expected: String,
        actual: String,
        path: PathBuf,
    },

    /// Stream ended before the declared byte count was read.
    #[error("unexpected end of file: {path}")]
    UnexpectedEof { path: PathBuf },
}

impl StoreError {
    /// Classify an I/O failure observed while reading `path`: a premature
    /// end of stream gets its own variant so callers can tell truncation
    /// from plain I/O trouble.
    pub(crate) fn io_at(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::UnexpectedEof {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}
