//! Error kinds surfaced by every pipeline stage.

use thiserror::Error;

/// The three failure classes of the pipeline. None of them is retried or
/// recovered internally; they propagate to whatever surface drives the
/// session (a tool, the browser dashboard).
#[derive(Error, Debug)]
pub enum Error {
    /// The archive or processing backend could not complete a call:
    /// unreachable storage, undecodable raster, pixel ceiling exceeded.
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// A user-supplied document is missing required structure.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// An internal invariant does not hold (short band id, duplicate year).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteService(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionViolation(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::RemoteService(format!("I/O: {e}"))
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Self::RemoteService(format!("TIFF: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedInput(format!("JSON: {e}"))
    }
}

impl From<geojson::Error> for Error {
    fn from(e: geojson::Error) -> Self {
        Self::MalformedInput(format!("GeoJSON: {e}"))
    }
}
