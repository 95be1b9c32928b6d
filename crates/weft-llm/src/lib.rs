pub mod error;
pub mod http;
pub mod mock;
pub mod provider;

pub use error::{ProviderError, Result};
pub use http::HttpLlmProvider;
pub use mock::MockLlmProvider;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, Role, StreamEvent};
