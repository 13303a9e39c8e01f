//! LLM provider trait.

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ProviderResult, TextRequest};

/// Capability contract every provider backend implements.
///
/// Dropping a returned future cancels the call, including any in-flight HTTP
/// request. Callers bound calls with `tokio::time::timeout`.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ProviderResult, LLMError>;

    /// Make a single-prompt text completion request.
    async fn complete(&self, request: TextRequest) -> Result<ProviderResult, LLMError>;
}
