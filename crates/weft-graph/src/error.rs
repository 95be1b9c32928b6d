use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] weft_store::StoreError),

    #[error(transparent)]
    Channel(#[from] weft_channels::ChannelError),

    #[error("keyword not found: {0}")]
    KeywordNotFound(String),

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl From<GraphError> for weft_core::error::WeftError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Store(e) => e.into(),
            GraphError::Channel(e) => e.into(),
            GraphError::KeywordNotFound(term) => weft_core::error::WeftError::NotFound(term),
            GraphError::SubjectNotFound(id) => weft_core::error::WeftError::NotFound(id),
            GraphError::InvariantViolation(msg) => {
                weft_core::error::WeftError::InvariantViolation(msg)
            }
            GraphError::Serialization(e) => weft_core::error::WeftError::Serialization(e),
        }
    }
}
