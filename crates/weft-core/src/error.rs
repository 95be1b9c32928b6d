use thiserror::Error;

/// Closed set of error kinds surfaced across the store, graph, analyzer,
/// summary, processor and proposal components. Crate-local error types
/// convert into this one at the boundary where they cross into the RPC
/// layer; `.code()` is the stable string sent back in `ResFrame::error`.
#[derive(Debug, Error)]
pub enum WeftError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("corrupt object {hash}: {reason}")]
    CorruptObject { hash: String, reason: String },

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("generation cancelled")]
    GenerationCancelled,

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context window overflow: {used} tokens exceeds usable window of {usable}")]
    ContextOverflow { used: usize, usable: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WeftError {
    /// Stable string code sent to clients in WS `ResFrame` error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            WeftError::NotFound(_) => "NOT_FOUND",
            WeftError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            WeftError::CorruptObject { .. } => "CORRUPT_OBJECT",
            WeftError::Timeout { .. } => "TIMEOUT",
            WeftError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            WeftError::GenerationCancelled => "GENERATION_CANCELLED",
            WeftError::RateLimited { .. } => "RATE_LIMITED",
            WeftError::ContextOverflow { .. } => "CONTEXT_OVERFLOW",
            WeftError::Config(_) => "CONFIG_ERROR",
            WeftError::Serialization(_) => "SERIALIZATION_ERROR",
            WeftError::Io(_) => "IO_ERROR",
            WeftError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;
