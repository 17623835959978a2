//! Credential storage errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by credential stores.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Reading or writing the backing file failed.
    #[error("credential storage I/O failed for {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not hold valid credential data.
    #[error("credential file {path} is corrupt: {message}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The token is empty.
    #[error("credential token must not be empty")]
    EmptyToken,
}

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;
