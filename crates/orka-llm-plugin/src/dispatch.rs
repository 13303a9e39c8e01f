//! Method routing for incoming calls.
//!
//! The dispatcher is stateless: each call normalizes its arguments, picks a
//! backend by model name, makes one deadline-bound provider call and projects
//! the result onto the small, stable output contract. Every failure becomes a
//! `success: false` response; nothing escapes as a transport fault.

use std::future::Future;
use std::time::{Duration, Instant};

use orka_plugin_protocol::{Args, CallRequest, CallResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::args::{
    extract_messages, get_bool, get_float32, get_int, get_string, get_string_slice,
};
use crate::config::Config;
use crate::llm::{ChatMessage, ChatRequest, LLMError, ProviderResult, TextRequest, Usage};
use crate::router::{ModelRouter, RouteError};

pub const CHAT: &str = "Chat";
pub const COMPLETE: &str = "Complete";

// ============================================================================
// Errors
// ============================================================================

/// Everything that can turn a call into a failure response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("missing required arg: {0}")]
    MissingArg(&'static str),

    #[error("either messages[] or prompt is required")]
    MissingMessages,

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Provider(#[from] LLMError),

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    /// Caller mistakes, detected before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownMethod(_)
                | DispatchError::MissingArg(_)
                | DispatchError::MissingMessages
                | DispatchError::Route(_)
        )
    }
}

// ============================================================================
// Output contract
// ============================================================================

/// `data` of a successful Chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl From<ProviderResult> for ChatOutput {
    fn from(result: ProviderResult) -> Self {
        Self {
            content: result.content,
            finish_reason: result.finish_reason,
            usage: result.usage,
        }
    }
}

/// `data` of a successful Complete call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl From<ProviderResult> for CompleteOutput {
    fn from(result: ProviderResult) -> Self {
        Self {
            text: result.text.or(result.content),
            finish_reason: result.finish_reason,
            usage: result.usage,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes calls to handlers. Safe to share across connections.
pub struct Dispatcher {
    router: ModelRouter,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(router: ModelRouter, call_timeout: Duration) -> Self {
        Self {
            router,
            call_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            ModelRouter::from_config(&config.openai)?,
            config.call_timeout,
        ))
    }

    /// Handle one call. Always yields a well-formed response.
    pub async fn call(&self, request: CallRequest) -> CallResponse {
        let started = Instant::now();
        let method = normalize_method(&request.method);

        let result = match method.as_str() {
            CHAT => self.handle_chat(&request.args).await,
            COMPLETE => self.handle_complete(&request.args).await,
            _ => Err(DispatchError::UnknownMethod(request.method.clone())),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(data) => {
                debug!(method = %method, elapsed_ms, "Call succeeded");
                CallResponse::success(data)
            }
            Err(e) if e.is_validation() => {
                debug!(method = %method, error = %e, "Call rejected");
                CallResponse::failure(e.to_string())
            }
            Err(e) => {
                warn!(method = %method, elapsed_ms, error = %e, "Call failed");
                CallResponse::failure(e.to_string())
            }
        }
    }

    async fn handle_chat(&self, args: &Args) -> Result<Value, DispatchError> {
        let model = required(args, "model")?;
        let temperature = get_float32(args, "temperature", 0.0);
        let max_tokens = get_int(args, "maxTokens", 0);
        let top_p = get_float32(args, "topP", 0.0);
        let stop = get_string_slice(args, "stop");
        let stream = get_bool(args, "stream", false);

        let mut messages = extract_messages(args);
        if messages.is_empty() {
            let prompt = get_string(args, "prompt", "");
            if prompt.is_empty() {
                return Err(DispatchError::MissingMessages);
            }
            messages.push(ChatMessage::user(prompt));
        }

        let provider = self.router.resolve(&model, args)?;
        let result = self
            .bounded(provider.chat(ChatRequest {
                model,
                messages,
                temperature,
                max_tokens,
                top_p,
                stop,
                stream,
            }))
            .await?;

        Ok(serde_json::to_value(ChatOutput::from(result))?)
    }

    async fn handle_complete(&self, args: &Args) -> Result<Value, DispatchError> {
        let model = required(args, "model")?;
        let prompt = required(args, "prompt")?;
        let temperature = get_float32(args, "temperature", 0.0);
        let max_tokens = get_int(args, "maxTokens", 0);
        let top_p = get_float32(args, "topP", 0.0);
        let stop = get_string_slice(args, "stop");

        let provider = self.router.resolve(&model, args)?;
        let result = self
            .bounded(provider.complete(TextRequest {
                model,
                prompt,
                temperature,
                max_tokens,
                top_p,
                stop,
            }))
            .await?;

        Ok(serde_json::to_value(CompleteOutput::from(result))?)
    }

    /// Run a provider call under the call deadline. Expiry drops the call.
    async fn bounded<F>(&self, call: F) -> Result<ProviderResult, DispatchError>
    where
        F: Future<Output = Result<ProviderResult, LLMError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DispatchError::DeadlineExceeded(self.call_timeout)),
        }
    }
}

fn required(args: &Args, key: &'static str) -> Result<String, DispatchError> {
    let value = get_string(args, key, "");
    if value.is_empty() {
        return Err(DispatchError::MissingArg(key));
    }
    Ok(value)
}

/// Upper-case the first character; the rest is left alone.
pub fn normalize_method(method: &str) -> String {
    let mut chars = method.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
