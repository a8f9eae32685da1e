use thiserror::Error;

/// Errors surfaced by the store and the procedure layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Input has the wrong shape: empty title, malformed snapshot, bad count.
    #[error("{0}")]
    Validation(String),

    /// A row with the same title already exists for this owner.
    #[error("{0}")]
    Conflict(String),

    /// An ID does not refer to a row the acting owner can see.
    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Transport(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub(crate) fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
