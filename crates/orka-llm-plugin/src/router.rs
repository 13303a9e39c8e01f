//! Model-name routing to provider backends.
//!
//! Routes are tried in order; the first whose marker matches the lower-cased
//! model identifier builds the provider for the call.

use std::fmt;
use std::sync::Arc;

use orka_plugin_protocol::Args;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::args::get_string;
use crate::config::OpenAIConfig;
use crate::llm::{LLMProvider, OpenAIProvider, build_http_client};

/// Builds a provider for one call from that call's arguments.
pub type ProviderFactory =
    Arc<dyn Fn(&Args) -> Result<Arc<dyn LLMProvider>, RouteError> + Send + Sync>;

/// Errors raised while picking a backend for a model.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("missing {provider} API key: pass apiKey argument")]
    MissingApiKey { provider: &'static str },
}

/// One entry of the routing table.
#[derive(Clone)]
pub struct Route {
    name: &'static str,
    matches: fn(&str) -> bool,
    build: ProviderFactory,
}

impl Route {
    /// `matches` receives the model identifier already lower-cased.
    pub fn new<F>(name: &'static str, matches: fn(&str) -> bool, build: F) -> Self
    where
        F: Fn(&Args) -> Result<Arc<dyn LLMProvider>, RouteError> + Send + Sync + 'static,
    {
        Self {
            name,
            matches,
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("name", &self.name).finish()
    }
}

/// Ordered routing table.
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    routes: Vec<Route>,
}

impl ModelRouter {
    /// An empty table; every model is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// The production table.
    pub fn from_config(config: &OpenAIConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        Ok(Self::new().with_route(openai_route(client, config)))
    }

    /// Append a route; earlier routes win.
    #[must_use]
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Pick and build the backend for `model`.
    pub fn resolve(&self, model: &str, args: &Args) -> Result<Arc<dyn LLMProvider>, RouteError> {
        let lower = model.to_lowercase();
        let route = self
            .routes
            .iter()
            .find(|r| (r.matches)(&lower))
            .ok_or_else(|| RouteError::UnsupportedModel(model.to_string()))?;
        debug!(model, route = route.name, "Routed model");
        (route.build)(args)
    }
}

/// GPT family and the `o1` reasoning models.
pub fn is_openai_model(lower: &str) -> bool {
    lower.starts_with("gpt-") || lower.contains("gpt") || lower.starts_with("o1")
}

fn openai_route(client: Client, config: &OpenAIConfig) -> Route {
    let base_url = config.base_url.clone();
    let retry = config.retry.clone();
    Route::new("openai", is_openai_model, move |args| {
        let api_key = get_string(args, "apiKey", "");
        if api_key.is_empty() {
            return Err(RouteError::MissingApiKey { provider: "OpenAI" });
        }
        let provider = OpenAIProvider::new(client.clone(), api_key, base_url.clone())
            .with_retry_policy(retry.clone());
        Ok(Arc::new(provider) as Arc<dyn LLMProvider>)
    })
}
