//! Error types for the autorespond core crate.
//!
//! Transport failures carry the remote host or path they concern so the
//! caller can render a message that localizes the failure. Every
//! [`TransportError`] maps onto one of the coarse [`ErrorKind`]s used when
//! deciding how far a failure reaches (whole operation, one transfer, or one
//! artifact).

use thiserror::Error;

/// Top-level error type for configuration loading and setup.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration error (missing host, unknown method, bad values).
    #[error("Config error: {0}")]
    Config(String),

    /// A configured pattern failed to compile.
    #[error("Invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A remote transfer error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal to the whole operation; the administrator has to fix it.
    Configuration,
    /// The remote host could not be reached or the handshake failed.
    Connect,
    /// The remote host rejected the credentials.
    Auth,
    /// A single remote file or directory operation failed.
    RemoteIo,
}

/// Errors raised while talking to the remote host.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error(
        "the autoresponder is not completely set up (no ftphost configured); \
         please contact your system administrator"
    )]
    NotConfigured,

    #[error("FTP method is not recognized ({0})")]
    UnknownMethod(String),

    #[error("no file was given to transfer")]
    MissingPath,

    /// The credential source could not produce a usable password.
    #[error("cannot obtain login credentials: {0}")]
    Credentials(String),

    #[error("cannot connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error("cannot log in to {host}: {reason}")]
    Auth { host: String, reason: String },

    /// The SFTP subsystem could not be started on an SSH connection.
    #[error("cannot connect to sftp subsystem on {target}: {reason}")]
    Subsystem { target: String, reason: String },

    #[error("cannot change directory to {path}: {reason}")]
    ChangeDir { path: String, reason: String },

    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("error creating {path}: {reason}")]
    CreateDir { path: String, reason: String },

    #[error("error writing {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("error removing {path}: {reason}")]
    Remove { path: String, reason: String },
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotConfigured
            | TransportError::UnknownMethod(_)
            | TransportError::MissingPath => ErrorKind::Configuration,
            TransportError::Connect { .. } | TransportError::Subsystem { .. } => {
                ErrorKind::Connect
            }
            TransportError::Credentials(_) | TransportError::Auth { .. } => ErrorKind::Auth,
            TransportError::ChangeDir { .. }
            | TransportError::Read { .. }
            | TransportError::CreateDir { .. }
            | TransportError::Write { .. }
            | TransportError::Remove { .. } => ErrorKind::RemoteIo,
        }
    }
}
