use std::io;
use thiserror::Error;

/// Rejected input paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Corrupted path detected: {0:?}")]
    Corrupted(String),
    #[error("Path is outside of the defined root, path: [{0}]")]
    OutsideRoot(String),
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
}

/// Failures reported by a storage client.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unable to retrieve {what} for {path}")]
    MetadataUnavailable { what: &'static str, path: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Protocol(String),
}

impl StorageError {
    pub fn metadata(what: &'static str, path: &str) -> Self {
        StorageError::MetadataUnavailable {
            what,
            path: path.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Mount-time configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("A filesystem instance is required")]
    MissingStorage,
    #[error("Invalid root path: {0}")]
    InvalidRoot(#[from] PathError),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Unable to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Unable to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Rotation by {0} degrees is not supported")]
    UnsupportedRotation(i32),
}

/// Errors that abort a volume operation. Everything else is reported
/// through [`crate::models::Outcome`].
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Unsupported file type")]
    UnsupportedType,
}

pub type VolumeResult<T> = Result<T, VolumeError>;
