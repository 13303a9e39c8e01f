//! LLM provider abstraction and backends.

mod error;
mod openai;
mod provider;
mod retry;
mod types;

pub use error::LLMError;
pub use openai::{OpenAIProvider, build_http_client};
pub use provider::LLMProvider;
pub use retry::RetryPolicy;
pub use types::{ChatMessage, ChatRequest, ProviderResult, Role, TextRequest, Usage};
