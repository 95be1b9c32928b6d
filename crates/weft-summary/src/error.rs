use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error(transparent)]
    Store(#[from] weft_store::StoreError),

    #[error(transparent)]
    Channel(#[from] weft_channels::ChannelError),

    #[error(transparent)]
    Graph(#[from] weft_graph::GraphError),

    #[error(transparent)]
    Analyzer(#[from] weft_analyzer::AnalyzerError),

    #[error("summary not found for topic {0}")]
    NotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, SummaryError>;

impl From<SummaryError> for weft_core::error::WeftError {
    fn from(e: SummaryError) -> Self {
        match e {
            SummaryError::Store(e) => e.into(),
            SummaryError::Channel(e) => e.into(),
            SummaryError::Graph(e) => e.into(),
            SummaryError::Analyzer(e) => e.into(),
            SummaryError::NotFound(what) => weft_core::error::WeftError::NotFound(what),
            SummaryError::InvariantViolation(msg) => weft_core::error::WeftError::InvariantViolation(msg),
        }
    }
}
