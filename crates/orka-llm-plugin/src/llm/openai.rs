//! OpenAI chat completions provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::error::LLMError;
use super::provider::LLMProvider;
use super::retry::{RetryPolicy, retry_after};
use super::types::{ChatMessage, ChatRequest, ProviderResult, Role, TextRequest, Usage};
use crate::config::OpenAIConfig;

/// Build the pooled HTTP client shared by every OpenAI call.
pub fn build_http_client(config: &OpenAIConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .tcp_keepalive(config.keep_alive)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()
}

/// OpenAI provider bound to a single API key.
pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAIProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    #[must_use]
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send the request, retrying transient failures within the fixed budget.
    async fn send_with_retry(&self, body: &Request<'_>) -> Result<Response, LLMError> {
        let mut retry = 0;
        loop {
            match self.send(body).await {
                Ok(response) => return Ok(response),
                Err(failed) if failed.error.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay(retry, failed.retry_after);
                    retry += 1;
                    warn!(
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %failed.error,
                        "Transient OpenAI failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failed) => return Err(failed.error),
            }
        }
    }

    async fn send(&self, body: &Request<'_>) -> Result<Response, FailedAttempt> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(FailedAttempt::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let hint = retry_after(&response);
            let raw = response.text().await.unwrap_or_default();
            return Err(FailedAttempt {
                error: LLMError::Api {
                    status,
                    message: api_error_message(raw),
                },
                retry_after: hint,
            });
        }

        let text = response.text().await.map_err(FailedAttempt::from)?;
        serde_json::from_str(&text).map_err(|e| FailedAttempt::from(LLMError::from(e)))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ProviderResult, LLMError> {
        let body = to_request(&request);
        debug!(
            model = %request.model,
            messages = body.messages.len(),
            "Sending OpenAI chat completion"
        );

        let response = self
            .send_with_retry(&body)
            .await
            .map_err(|e| e.context("openai chat error"))?;

        Ok(from_response(response))
    }

    async fn complete(&self, request: TextRequest) -> Result<ProviderResult, LLMError> {
        self.chat(ChatRequest {
            model: request.model,
            messages: vec![ChatMessage::user(request.prompt)],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop,
            stream: false,
        })
        .await
    }
}

/// One attempt's failure, with the server's retry hint if it sent one.
struct FailedAttempt {
    error: LLMError,
    retry_after: Option<Duration>,
}

impl From<LLMError> for FailedAttempt {
    fn from(error: LLMError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

impl From<reqwest::Error> for FailedAttempt {
    fn from(error: reqwest::Error) -> Self {
        LLMError::Request(error).into()
    }
}

/// Prefer `error.message` from an OpenAI error body, else the raw body.
fn api_error_message(raw: String) -> String {
    serde_json::from_str::<ErrorBody>(&raw)
        .ok()
        .and_then(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(raw)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(serde::Serialize)]
struct RequestMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct Response {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(serde::Deserialize)]
struct ResponseChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(serde::Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(serde::Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Zero means unset, so it is never sent.
fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

fn to_request(request: &ChatRequest) -> Request<'_> {
    Request {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(|m| RequestMessage {
                role: m.role(),
                content: &m.content,
            })
            .collect(),
        temperature: non_zero(request.temperature),
        max_tokens: non_zero(request.max_tokens),
        top_p: non_zero(request.top_p),
    }
}

fn from_response(response: Response) -> ProviderResult {
    let usage = response.usage.unwrap_or_default();
    let mut result = ProviderResult {
        id: response.id,
        model: response.model,
        usage: Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
        ..ProviderResult::default()
    };

    // Only the first choice is surfaced.
    if let Some(choice) = response.choices.into_iter().next() {
        let message = choice.message.unwrap_or(ResponseMessage {
            role: None,
            content: None,
        });
        result.finish_reason = Some(choice.finish_reason.unwrap_or_default());
        result.content = Some(message.content.unwrap_or_default());
        result.role = Some(message.role.unwrap_or_default());
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const COMPLETION: &str = r#"{
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "gpt-4o-2024-08-06",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": "Hello! How can I help?"},
                "finish_reason": "stop"
            },
            {
                "index": 1,
                "message": {"role": "assistant", "content": "ignored"},
                "finish_reason": "length"
            }
        ],
        "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
    }"#;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    fn provider(server: &Server, retry: RetryPolicy) -> OpenAIProvider {
        let client = build_http_client(&OpenAIConfig::default()).unwrap();
        OpenAIProvider::new(client, "sk-test".to_string(), server.url()).with_retry_policy(retry)
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![
                ChatMessage::new("system", "Be brief."),
                ChatMessage::new("user", "Hi"),
                ChatMessage::new("assistant", "Hello."),
                ChatMessage::new("developer", "Again"),
            ],
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn test_chat_maps_roles_and_omits_zero_optionals() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::Json(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Hello."},
                    {"role": "user", "content": "Again"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(COMPLETION)
            .create_async()
            .await;

        let mut request = chat_request();
        request.stop = vec!["END".to_string()];
        request.stream = true;
        let result = provider(&server, fast_retry(0)).chat(request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.id, "chatcmpl-123");
        assert_eq!(result.model, "gpt-4o-2024-08-06");
        assert_eq!(result.content.as_deref(), Some("Hello! How can I help?"));
        assert_eq!(result.role.as_deref(), Some("assistant"));
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
        assert_eq!(result.text, None);
        assert_eq!(
            result.usage,
            Usage {
                prompt_tokens: 10,
                completion_tokens: 8,
                total_tokens: 18
            }
        );
    }

    #[tokio::test]
    async fn test_chat_sends_non_zero_optionals() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Json(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hi"}],
                "temperature": 0.5,
                "max_tokens": 100,
                "top_p": 0.25
            })))
            .with_status(200)
            .with_body(COMPLETION)
            .create_async()
            .await;

        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user("Hi")],
            temperature: 0.5,
            max_tokens: 100,
            top_p: 0.25,
            ..ChatRequest::default()
        };
        provider(&server, fast_retry(0)).chat(request).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_wraps_prompt_as_user_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Json(json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Write a haiku"}],
                "max_tokens": 32
            })))
            .with_status(200)
            .with_body(COMPLETION)
            .create_async()
            .await;

        let result = provider(&server, fast_retry(0))
            .complete(TextRequest {
                model: "gpt-4o-mini".to_string(),
                prompt: "Write a haiku".to_string(),
                max_tokens: 32,
                ..TextRequest::default()
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.content.as_deref(), Some("Hello! How can I help?"));
        assert_eq!(result.text, None);
    }

    #[tokio::test]
    async fn test_missing_usage_and_choices_default() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"id": "chatcmpl-456", "model": "gpt-4o", "choices": []}"#)
            .create_async()
            .await;

        let result = provider(&server, fast_retry(0))
            .chat(chat_request())
            .await
            .unwrap();

        assert_eq!(result.id, "chatcmpl-456");
        assert_eq!(result.content, None);
        assert_eq!(result.finish_reason, None);
        assert_eq!(result.role, None);
        assert_eq!(result.usage, Usage::default());
    }

    #[tokio::test]
    async fn test_null_content_becomes_empty() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                r#"{"id": "x", "model": "gpt-4o",
                    "choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": null}],
                    "usage": {"prompt_tokens": 3}}"#,
            )
            .create_async()
            .await;

        let result = provider(&server, fast_retry(0))
            .chat(chat_request())
            .await
            .unwrap();

        assert_eq!(result.content.as_deref(), Some(""));
        assert_eq!(result.finish_reason.as_deref(), Some(""));
        assert_eq!(result.usage.prompt_tokens, 3);
        assert_eq!(result.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_api_error_is_wrapped_and_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = provider(&server, fast_retry(3))
            .chat(chat_request())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err.to_string(),
            "openai chat error: api error (status 401): Incorrect API key provided"
        );
    }

    #[tokio::test]
    async fn test_transient_errors_use_retry_budget() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("upstream overloaded")
            .expect(3)
            .create_async()
            .await;

        let err = provider(&server, fast_retry(2))
            .chat(chat_request())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err.to_string(),
            "openai chat error: api error (status 503): upstream overloaded"
        );
    }

    #[tokio::test]
    async fn test_invalid_body_is_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = provider(&server, fast_retry(0))
            .chat(chat_request())
            .await
            .unwrap_err();

        assert!(
            err.to_string()
                .starts_with("openai chat error: invalid response body")
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        let client = build_http_client(&OpenAIConfig::default()).unwrap();
        let provider = OpenAIProvider::new(
            client,
            "sk-test".to_string(),
            "http://127.0.0.1:1".to_string(),
        )
        .with_retry_policy(fast_retry(0));

        let err = provider.chat(chat_request()).await.unwrap_err();
        assert!(
            err.to_string()
                .starts_with("openai chat error: http request failed")
        );
    }

    #[test]
    fn test_api_error_message_falls_back_to_raw_body() {
        assert_eq!(api_error_message("plain".to_string()), "plain");
        assert_eq!(
            api_error_message(r#"{"error": {"message": ""}}"#.to_string()),
            r#"{"error": {"message": ""}}"#
        );
        assert_eq!(
            api_error_message(r#"{"error": {"message": "quota"}}"#.to_string()),
            "quota"
        );
    }

    #[test]
    fn test_non_zero() {
        assert_eq!(non_zero(0.0f32), None);
        assert_eq!(non_zero(0.7f32), Some(0.7));
        assert_eq!(non_zero(0i64), None);
        assert_eq!(non_zero(-1i64), Some(-1));
    }
}
