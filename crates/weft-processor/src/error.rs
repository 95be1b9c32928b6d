use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Store(#[from] weft_store::StoreError),

    #[error(transparent)]
    Channel(#[from] weft_channels::ChannelError),

    #[error(transparent)]
    Graph(#[from] weft_graph::GraphError),

    #[error(transparent)]
    Analyzer(#[from] weft_analyzer::AnalyzerError),

    #[error(transparent)]
    Summary(#[from] weft_summary::SummaryError),

    #[error(transparent)]
    Provider(#[from] weft_llm::ProviderError),

    #[error("topic queue for {0} is no longer accepting messages")]
    QueueClosed(String),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

/// True for failures that originate in durable storage — these abort a
/// drain pass and leave the message at the head of the queue,
/// as opposed to LLM failures, which are retried and eventually persisted
/// as a `status = error` assistant message.
impl ProcessorError {
    pub fn is_store_fault(&self) -> bool {
        matches!(self, ProcessorError::Store(_) | ProcessorError::Channel(_) | ProcessorError::Graph(_))
    }
}

impl From<ProcessorError> for weft_core::error::WeftError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::Store(e) => e.into(),
            ProcessorError::Channel(e) => e.into(),
            ProcessorError::Graph(e) => e.into(),
            ProcessorError::Analyzer(e) => e.into(),
            ProcessorError::Summary(e) => e.into(),
            ProcessorError::Provider(e) => e.into(),
            ProcessorError::QueueClosed(what) => weft_core::error::WeftError::Internal(what),
        }
    }
}
