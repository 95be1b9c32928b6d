use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found for hash {0}")]
    NotFound(String),

    #[error("corrupt object {hash}: {reason}")]
    Corrupt { hash: String, reason: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for weft_core::error::WeftError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => weft_core::error::WeftError::NotFound(what),
            StoreError::Corrupt { hash, reason } => {
                weft_core::error::WeftError::CorruptObject { hash, reason }
            }
            StoreError::InvariantViolation(msg) => {
                weft_core::error::WeftError::InvariantViolation(msg)
            }
            StoreError::Serialization(e) => weft_core::error::WeftError::Serialization(e),
            StoreError::Io(e) => weft_core::error::WeftError::Io(e),
        }
    }
}
