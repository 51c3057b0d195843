//! Error types.

use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::BincodeError(e.to_string())
    }
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unrecoverable condition, already reported through the logger.
    ///
    /// Carries the kind of the entity that raised it. Top-level run loops
    /// are expected to terminate the process when they see this variant.
    #[error("fatal error in {kind}: {msg}")]
    Fatal { kind: String, msg: String },

    #[error("io error: {0}")]
    IoError(String),
    #[error("bincode error: {0}")]
    BincodeError(String),
    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),

    #[error("parsing error: {0}")]
    ParsingError(String),
    #[error("failed parsing int: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("failed parsing float: {0}")]
    ParseFloatError(#[from] ParseFloatError),

    #[error("invalid var type: expected {expected}, got {got}")]
    InvalidVarType { expected: String, got: String },
    #[error("unknown simulation model: {0}")]
    UnknownModel(String),
    #[error("no property named: {0}")]
    NoProperty(String),
    #[error("no method named: {0}")]
    NoMethod(String),
    #[error("column length mismatch: expected {expected} rows, got {got}")]
    ColumnLengthMismatch { expected: usize, got: usize },

    #[cfg(feature = "lz4")]
    #[error("failed decompressing snapshot: {0}")]
    SnapshotDecompressionError(String),
    #[error("failed reading snapshot: {0}")]
    FailedReadingSnapshot(String),
    #[error("failed creating snapshot: {0}")]
    FailedCreatingSnapshot(String),
    #[error("unsupported snapshot version: {0}")]
    UnsupportedSnapshotVersion(u32),
    #[error("state not found at: {0}")]
    StateNotFound(PathBuf),

    #[error("result already sent on this channel")]
    ResultAlreadySent,
    #[error("worker exited without delivering a result")]
    WorkerNoResult,
    #[error("job carries no result file")]
    NoResultFile,
    #[error("no entity kind registered for worker: {0}")]
    UnregisteredKind(String),

    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns true if the error is an unrecoverable `Fatal` condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }
}
