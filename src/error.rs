//! Error type shared by providers, the controller and configuration.

use std::path::PathBuf;

use crate::provider::GallerySize;

/// Every fallible operation in the crate reports one of these.
///
/// Per-page failures are rendered to a string when they cross the listener
/// boundary; provider-fatal failures are stored as the provider's error text.
#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    /// None (or more than one) of directory, archive and gallery was given.
    #[error("no gallery provider could be built from the given parameters")]
    NoProvider,

    #[error("page {index} is out of range (size {size})")]
    IndexOutOfRange { index: usize, size: GallerySize },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid gallery manifest: {0}")]
    Manifest(String),

    #[error("{0} contains no supported images")]
    EmptyGallery(String),

    #[error("background runtime error: {0}")]
    Runtime(String),

    #[error("page {0} has not finished loading")]
    PageNotReady(usize),

    #[error("failed to export page: {0}")]
    Export(String),

    /// The page was superseded or the provider stopped while it was produced.
    #[error("page request was cancelled")]
    Cancelled,
}

impl GalleryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for GalleryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Network(format!("request timed out: {error}"))
        } else if let Some(status) = error.status() {
            Self::Network(format!("server answered {status}"))
        } else {
            Self::Network(error.to_string())
        }
    }
}

pub type Result<T, E = GalleryError> = std::result::Result<T, E>;
