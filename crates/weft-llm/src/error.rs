use thiserror::Error;

/// Closed set of LLM-provider failure modes. `Http`/`Parse` are
/// transparent wrappers for transport-level failures that don't map onto a
/// named spec error.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("prompt exceeds model context window ({used} > {usable} tokens)")]
    ContextOverflow { used: usize, usable: usize },

    #[error("generation cancelled")]
    GenerationCancelled,

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<ProviderError> for weft_core::error::WeftError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Http(e) => weft_core::error::WeftError::ProviderUnavailable(e.to_string()),
            ProviderError::Parse(msg) => weft_core::error::WeftError::ProviderUnavailable(msg),
            ProviderError::ProviderUnavailable(msg) => weft_core::error::WeftError::ProviderUnavailable(msg),
            ProviderError::ContextOverflow { used, usable } => weft_core::error::WeftError::ContextOverflow { used, usable },
            ProviderError::GenerationCancelled => weft_core::error::WeftError::GenerationCancelled,
            ProviderError::RateLimited { retry_after_ms } => weft_core::error::WeftError::RateLimited { retry_after_ms },
        }
    }
}
