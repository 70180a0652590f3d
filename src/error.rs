//! Error taxonomy for cbio
//!
//! Every fallible operation returns exactly one kind from a closed set.
//! Engine codes are translated at the boundary and never leak to callers.
//!
//! | Code | Kind            | Description              |
//! |------|-----------------|--------------------------|
//! | 0    | (success)       | `success`                |
//! | 1    | OutOfMemory     | `allocation failed`      |
//! | 2    | Io              | `io error`               |
//! | 3    | InvalidArgument | `invalid arguments`      |
//! | 4    | Internal        | `Internal error`         |
//! | 5    | OpenFile        | `failed to open file`    |
//! | 6    | Corrupt         | `file corrupt`           |
//! | 7    | NotFound        | `no entry`               |
//! | 8    | NoHeader        | `no header`              |
//! | 9    | HeaderVersion   | `illegal header version` |
//! | 10   | ChecksumFail    | `checksum fail`          |

use thiserror::Error;

use crate::engine::EngineError;

/// Description rendered for a successful outcome.
pub const SUCCESS_MESSAGE: &str = "success";

/// Adapter error kinds. `Display` yields the stable description string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    #[error("allocation failed")]
    OutOfMemory,

    #[error("io error")]
    Io,

    #[error("invalid arguments")]
    InvalidArgument,

    #[error("Internal error")]
    Internal,

    #[error("failed to open file")]
    OpenFile,

    #[error("file corrupt")]
    Corrupt,

    #[error("no entry")]
    NotFound,

    #[error("no header")]
    NoHeader,

    #[error("illegal header version")]
    HeaderVersion,

    #[error("checksum fail")]
    ChecksumFail,
}

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable numeric code. Zero is reserved for success.
    pub fn code(&self) -> u8 {
        match self {
            Error::OutOfMemory => 1,
            Error::Io => 2,
            Error::InvalidArgument => 3,
            Error::Internal => 4,
            Error::OpenFile => 5,
            Error::Corrupt => 6,
            Error::NotFound => 7,
            Error::NoHeader => 8,
            Error::HeaderVersion => 9,
            Error::ChecksumFail => 10,
        }
    }

    /// Stable human-readable description.
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::OutOfMemory => "allocation failed",
            Error::Io => "io error",
            Error::InvalidArgument => "invalid arguments",
            Error::Internal => "Internal error",
            Error::OpenFile => "failed to open file",
            Error::Corrupt => "file corrupt",
            Error::NotFound => "no entry",
            Error::NoHeader => "no header",
            Error::HeaderVersion => "illegal header version",
            Error::ChecksumFail => "checksum fail",
        }
    }
}

/// Translates an engine error into the adapter taxonomy.
///
/// Total: codes without a dedicated kind become [`Error::Internal`].
pub fn remap_error(err: &EngineError) -> Error {
    match err {
        EngineError::OpenFile => Error::OpenFile,
        EngineError::Corrupt => Error::Corrupt,
        EngineError::AllocFail => Error::OutOfMemory,
        EngineError::Read | EngineError::Write => Error::Io,
        EngineError::DocNotFound | EngineError::NoSuchFile => Error::NotFound,
        EngineError::NoHeader => Error::NoHeader,
        EngineError::HeaderVersion => Error::HeaderVersion,
        EngineError::ChecksumFail => Error::ChecksumFail,
        EngineError::InvalidArguments => Error::InvalidArgument,
        EngineError::Cancel | EngineError::FileClose | EngineError::Other(_) => Error::Internal,
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        remap_error(&err)
    }
}

/// Renders any outcome, success included.
pub fn strerror<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => SUCCESS_MESSAGE,
        Err(e) => e.as_str(),
    }
}
