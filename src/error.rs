//! Error types for IIDF storage operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IidError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported format version {found} (this reader understands version {expected})")]
    BadVersion { found: u32, expected: u32 },

    #[error("Truncated file: {context} needs {needed} bytes, {available} available")]
    Truncated {
        context: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("Corrupt file: {0}")]
    Corrupt(String),

    #[error("Key {0} not present in lookup table")]
    KeyNotFound(u32),

    #[error("Group {0:?} not present in groups block")]
    GroupNotFound(String),

    #[error("Duplicate IID {0}")]
    DuplicateIid(String),

    #[error("{what} for key {key} not materialized (fetch it or enable autoload)")]
    NotLoaded { key: u32, what: &'static str },
}

pub type Result<T> = std::result::Result<T, IidError>;
