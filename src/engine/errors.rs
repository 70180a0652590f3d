//! Engine error codes
//!
//! These mirror the status codes an embedded engine reports. They are
//! private to the engine boundary: the adapter translates them with
//! [`crate::error::remap_error`] before anything reaches a caller.

use std::io;

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine status codes (success is `Ok`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum EngineError {
    #[error("error opening file")]
    OpenFile,

    #[error("malformed data in file")]
    Corrupt,

    #[error("failed to allocate buffer")]
    AllocFail,

    #[error("error reading file")]
    Read,

    #[error("document not found")]
    DocNotFound,

    #[error("no header in non-empty file")]
    NoHeader,

    #[error("error writing to file")]
    Write,

    #[error("incorrect version in header")]
    HeaderVersion,

    #[error("checksum fail")]
    ChecksumFail,

    #[error("invalid arguments")]
    InvalidArguments,

    #[error("no such file")]
    NoSuchFile,

    #[error("operation cancelled")]
    Cancel,

    #[error("error closing file")]
    FileClose,

    #[error("unrecognized engine status {0}")]
    Other(i32),
}

impl EngineError {
    /// Raw status code as reported by the engine.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::OpenFile => -1,
            EngineError::Corrupt => -2,
            EngineError::AllocFail => -3,
            EngineError::Read => -4,
            EngineError::DocNotFound => -5,
            EngineError::NoHeader => -6,
            EngineError::Write => -7,
            EngineError::HeaderVersion => -8,
            EngineError::ChecksumFail => -9,
            EngineError::InvalidArguments => -10,
            EngineError::NoSuchFile => -11,
            EngineError::Cancel => -12,
            EngineError::FileClose => -13,
            EngineError::Other(code) => *code,
        }
    }

    /// Classifies a failure to open the backing file.
    pub fn from_open(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => EngineError::NoSuchFile,
            io::ErrorKind::InvalidInput => EngineError::InvalidArguments,
            io::ErrorKind::OutOfMemory => EngineError::AllocFail,
            _ => EngineError::OpenFile,
        }
    }

    /// Classifies a failure while reading the backing file.
    pub fn from_read(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => EngineError::Corrupt,
            io::ErrorKind::OutOfMemory => EngineError::AllocFail,
            _ => EngineError::Read,
        }
    }

    /// Classifies a failure while writing the backing file.
    pub fn from_write(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::OutOfMemory => EngineError::AllocFail,
            _ => EngineError::Write,
        }
    }
}
