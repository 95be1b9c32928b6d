use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Graph(#[from] weft_graph::GraphError),

    #[error(transparent)]
    Channel(#[from] weft_channels::ChannelError),

    #[error(transparent)]
    Provider(#[from] weft_llm::ProviderError),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

impl From<AnalyzerError> for weft_core::error::WeftError {
    fn from(e: AnalyzerError) -> Self {
        match e {
            AnalyzerError::Graph(e) => e.into(),
            AnalyzerError::Channel(e) => e.into(),
            AnalyzerError::Provider(e) => e.into(),
        }
    }
}
