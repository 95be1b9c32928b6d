use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel not found: {0}")]
    NotFound(String),

    #[error("corrupt log {path} at line {line}: {reason}")]
    CorruptLog {
        path: String,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] weft_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<ChannelError> for weft_core::error::WeftError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NotFound(what) => weft_core::error::WeftError::NotFound(what),
            ChannelError::CorruptLog { path, reason, .. } => {
                weft_core::error::WeftError::CorruptObject { hash: path, reason }
            }
            ChannelError::Store(e) => e.into(),
            ChannelError::Serialization(e) => weft_core::error::WeftError::Serialization(e),
            ChannelError::Io(e) => weft_core::error::WeftError::Io(e),
        }
    }
}
