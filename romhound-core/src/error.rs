use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while decoding a ROM file into its canonical bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file could not be opened or stat'd
    #[error("cannot read {path}: {source}")]
    NotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error while reading the ROM data
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte stream doesn't match the structure the decoder expects
    #[error("invalid ROM format: {0}")]
    InvalidFormat(String),

    /// A container (zip/7z/gz) had no entry matching any registered decoder
    #[error("no valid ROM found in container")]
    NoValidRomFound,

    /// No decoder is registered for this extension
    #[error("no registered decoder for extension '{0}'")]
    UnknownExtension(String),
}

impl DecodeError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn not_readable(path: &Path, source: io::Error) -> Self {
        Self::NotReadable {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<zip::result::ZipError> for DecodeError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::InvalidFormat(other.to_string()),
        }
    }
}
