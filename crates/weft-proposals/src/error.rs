use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error(transparent)]
    Store(#[from] weft_store::StoreError),

    #[error(transparent)]
    Channel(#[from] weft_channels::ChannelError),

    #[error(transparent)]
    Graph(#[from] weft_graph::GraphError),

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProposalError>;

impl From<ProposalError> for weft_core::error::WeftError {
    fn from(e: ProposalError) -> Self {
        match e {
            ProposalError::Store(e) => e.into(),
            ProposalError::Channel(e) => e.into(),
            ProposalError::Graph(e) => e.into(),
            ProposalError::SubjectNotFound(id) => weft_core::error::WeftError::NotFound(id),
            ProposalError::Serialization(e) => weft_core::error::WeftError::Serialization(e),
            ProposalError::Io(e) => weft_core::error::WeftError::Io(e),
        }
    }
}
