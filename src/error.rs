// mpa Error Types

use serde::Serialize;
use thiserror::Error;

/// A problem with one item of a batch (an upload, a deletion or a title edit).
/// Recorded in the batch outcome, never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Original filename, `image=<id>` for catalog targets, or empty for the batch.
    pub item: String,
    pub message: String,
}

impl ItemError {
    pub fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.item.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.item, self.message)
        }
    }
}

/// Outcome shared by every waiter of one preview job, so it must be cloneable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    #[error("Preview generation failed for {hash}: {message}")]
    Failed { hash: String, message: String },

    #[error("Preview service is shutting down")]
    ShuttingDown,
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("{0}")]
    Validation(String),

    #[error("No uploaded image was successfully processed")]
    NothingIngested(Vec<ItemError>),

    #[error("Album not found: {0}")]
    AlbumNotFound(i64),

    #[error("Album {0} does not belong to this user")]
    NotOwner(i64),

    #[error("Image not found: {0}")]
    ImageNotFound(i64),

    #[error("Album transaction failed: {source}")]
    Transaction {
        #[source]
        source: rusqlite::Error,
        errors: Vec<ItemError>,
    },

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl GalleryError {
    /// Item errors collected before the failure, if the variant carries any.
    pub fn item_errors(&self) -> &[ItemError] {
        match self {
            GalleryError::Transaction { errors, .. } => errors,
            GalleryError::NothingIngested(errors) => errors,
            _ => &[],
        }
    }
}

impl From<anyhow::Error> for GalleryError {
    fn from(err: anyhow::Error) -> Self {
        GalleryError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
