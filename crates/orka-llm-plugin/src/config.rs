use std::time::Duration;

use thiserror::Error;

use crate::llm::{OpenAIProvider, RetryPolicy};

// ============================================================================
// Config (root)
// ============================================================================

/// Runtime configuration. Only the port is chosen at startup; the rest is fixed.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub openai: OpenAIConfig,
    /// Deadline for one Chat/Complete call, retries included.
    pub call_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            openai: OpenAIConfig::default(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl Config {
    /// Build the runtime config for the given listening port.
    pub fn for_port(port: u16) -> Result<Self, ConfigError> {
        if port == 0 {
            return Err(ConfigError::MissingPort);
        }
        Ok(Self {
            server: ServerConfig {
                port,
                ..ServerConfig::default()
            },
            ..Self::default()
        })
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(120)
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

// ============================================================================
// OpenAIConfig
// ============================================================================

/// HTTP client and retry settings for the OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Per-attempt ceiling; the call deadline still bounds the whole call.
    pub request_timeout: Duration,
    pub keep_alive: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub retry: RetryPolicy,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: OpenAIProvider::DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            keep_alive: Duration::from_secs(60),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing --port")]
    MissingPort,
}

// ============================================================================
// Tests
// ============================================================================
