use std::path::PathBuf;

use thiserror::Error;

/// Errors a caller may want to match on.
///
/// Pipeline functions return `anyhow::Result`; these stay reachable through
/// `err.downcast_ref::<Error>()`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("source is not readable: {}", .0.display())]
    SourceNotReadable(PathBuf),
    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
