use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisiRideError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert of a record whose key is already taken.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Transient store failure; the only error class that is retried.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VisiRideError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, VisiRideError>;
