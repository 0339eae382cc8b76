use std::path::PathBuf;

use romhound_core::DecodeError;
use thiserror::Error;

/// Errors a hash request can end in.
///
/// `Clone` because results (including failures) are cached and handed to
/// every subsequent caller for the same path — I/O errors are captured as
/// messages for that reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// The file could not be opened or stat'd
    #[error("cannot read {path}: {message}")]
    NotReadable { path: PathBuf, message: String },

    /// A decoder determined the bytes don't match its expected structure
    #[error("invalid ROM format: {0}")]
    InvalidFormat(String),

    /// A container had no entry matching any registered decoder
    #[error("no valid ROM found in container")]
    NoValidRomFound,

    /// No decoder is registered for this extension
    #[error("no registered decoder for extension '{0}'")]
    UnknownExtension(String),

    /// I/O failure while streaming the canonical bytes
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<DecodeError> for HashError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::NotReadable { path, source } => Self::NotReadable {
                path,
                message: source.to_string(),
            },
            DecodeError::Io(e) => Self::Io(e.to_string()),
            DecodeError::InvalidFormat(msg) => Self::InvalidFormat(msg),
            DecodeError::NoValidRomFound => Self::NoValidRomFound,
            DecodeError::UnknownExtension(ext) => Self::UnknownExtension(ext),
        }
    }
}

/// Errors an identity source can answer with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source affirmatively knows the ROM isn't in its catalog.
    /// Falls through to the next source; never retried against the same one.
    #[error("not found in source")]
    NotFound,

    /// Something that may succeed on a later attempt (network, provider
    /// hiccup, hash I/O). Triggers a full-sweep retry.
    #[error("{0}")]
    Transient(String),

    /// The pipeline was cancelled while this lookup was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// True if a retry of the sweep could change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<HashError> for SourceError {
    fn from(err: HashError) -> Self {
        // Hash failures are cached by the hasher, so retrying them through
        // the pipeline is cheap; treat them like any other lookup failure.
        Self::Transient(err.to_string())
    }
}

/// Errors from downloading media files.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media not found at {0}")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reading or writing a gamelist file.
#[derive(Debug, Error)]
pub enum GamelistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gamelist parse error: {0}")]
    Parse(String),
}

/// Errors loading a hash database.
#[derive(Debug, Error)]
pub enum HashDbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("hash database is missing required column '{0}'")]
    MissingColumn(&'static str),
}
