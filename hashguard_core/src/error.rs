//! Error types for hashguard_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hashguard_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The upload stream yielded no bytes.
    #[error("Storing empty files is not allowed")]
    EmptyInput,

    /// An object with the same digest is already stored.
    #[error("Content already stored: {digest}")]
    DuplicateContent { digest: String },

    /// Caller-supplied digest failed the format check.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Well-formed digest with no matching object.
    #[error("Object not found: {digest}")]
    NotFound { digest: String },

    /// Deletion refused because the file is still held open elsewhere.
    #[error("Resource busy, retry later: {path}")]
    ResourceBusy { path: PathBuf },

    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Malformed configuration file.
    #[error("Invalid config at {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },
}

/// Caller-visible failure categories.
///
/// Front ends map each kind to a distinct status signal (HTTP status, exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyInput,
    DuplicateContent,
    InvalidDigest,
    NotFound,
    ResourceBusy,
    IoFailure,
    Config,
}

impl ErrorKind {
    /// Stable numeric code for this kind. `0` is reserved for success.
    pub fn result_code(&self) -> u8 {
        match self {
            ErrorKind::IoFailure => 1,
            ErrorKind::EmptyInput => 2,
            ErrorKind::DuplicateContent => 3,
            ErrorKind::InvalidDigest => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::ResourceBusy => 6,
            ErrorKind::Config => 7,
        }
    }

    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::DuplicateContent => "duplicate_content",
            ErrorKind::InvalidDigest => "invalid_digest",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ResourceBusy => "resource_busy",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::Config => "config",
        }
    }
}

impl Error {
    /// Create a DuplicateContent error.
    pub fn duplicate_content(digest: impl Into<String>) -> Self {
        Error::DuplicateContent {
            digest: digest.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(digest: impl Into<String>) -> Self {
        Error::NotFound {
            digest: digest.into(),
        }
    }

    /// Create a ResourceBusy error.
    pub fn resource_busy(path: impl Into<PathBuf>) -> Self {
        Error::ResourceBusy { path: path.into() }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The caller-visible category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyInput => ErrorKind::EmptyInput,
            Error::DuplicateContent { .. } => ErrorKind::DuplicateContent,
            Error::InvalidDigest { .. } => ErrorKind::InvalidDigest,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            Error::Io { .. } => ErrorKind::IoFailure,
            Error::UnsupportedAlgorithm { .. } | Error::InvalidConfig { .. } => ErrorKind::Config,
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ResourceBusy
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
