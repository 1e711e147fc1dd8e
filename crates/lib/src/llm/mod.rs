//! Generative API clients.
//!
//! Each provider kind maps a [`GenerationRequest`] onto its HTTP API and
//! returns the generated code as text. Clients are built from a
//! [`ProviderConfig`]; API keys are read from the environment at build time.

pub mod anthropic;
pub mod custom;
pub mod openai;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use thiserror::Error;

use crate::consts::APP_NAME;
use crate::manifest::{ProviderConfig, ProviderKind};

pub use anthropic::AnthropicClient;
pub use custom::CustomClient;
pub use openai::OpenAiClient;

/// System prompt sent to chat-style providers.
pub const SYSTEM_PROMPT: &str =
  "You are an AI assistant specialised in generating code and resources for gRPC services.";

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u64 = 2000;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
  #[error("API key not set: environment variable {0} is empty or missing")]
  MissingApiKey(String),

  #[error("provider '{0}' has no endpoint configured")]
  MissingEndpoint(String),

  #[error("unknown generative provider '{0}'")]
  UnknownProvider(String),

  #[error("provider returned HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("request failed: {0}")]
  Transport(String),

  #[error("invalid provider response: {0}")]
  InvalidResponse(String),
}

/// A single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
  pub model: Option<String>,
  pub prompt: String,
  pub params: BTreeMap<String, Value>,
}

impl GenerationRequest {
  pub fn temperature(&self) -> f64 {
    self
      .params
      .get("temperature")
      .and_then(Value::as_f64)
      .unwrap_or(DEFAULT_TEMPERATURE)
  }

  pub fn max_tokens(&self) -> u64 {
    self
      .params
      .get("max_tokens")
      .and_then(Value::as_u64)
      .unwrap_or(DEFAULT_MAX_TOKENS)
  }
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
  /// Provider name, for logs.
  fn name(&self) -> &str;

  /// Generate code for the request. Returns the raw text produced.
  async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Build a client for a provider configuration.
pub fn build_client(name: &str, config: &ProviderConfig) -> Result<Arc<dyn GenerativeClient>, GenerationError> {
  let key_var = config.api_key_var();
  let api_key = std::env::var(key_var).ok().filter(|key| !key.is_empty());

  let client: Arc<dyn GenerativeClient> = match config.kind {
    ProviderKind::Openai => {
      let api_key = api_key.ok_or_else(|| GenerationError::MissingApiKey(key_var.to_string()))?;
      Arc::new(OpenAiClient::new(api_key, config.base_url.clone())?)
    }
    ProviderKind::Anthropic => {
      let api_key = api_key.ok_or_else(|| GenerationError::MissingApiKey(key_var.to_string()))?;
      Arc::new(AnthropicClient::new(api_key, config.base_url.clone())?)
    }
    ProviderKind::Custom => {
      let endpoint = config
        .base_url
        .clone()
        .ok_or_else(|| GenerationError::MissingEndpoint(name.to_string()))?;
      Arc::new(CustomClient::new(endpoint, api_key)?)
    }
  };
  Ok(client)
}

/// Unwrap code enclosed in a single markdown fence.
///
/// Text with no fence, or with more than one fenced block, is returned trimmed
/// but otherwise unchanged.
pub fn strip_code_fence(text: &str) -> String {
  let trimmed = text.trim();
  let Some(rest) = trimmed.strip_prefix("```") else {
    return trimmed.to_string();
  };
  let Some(body) = rest.strip_suffix("```") else {
    return trimmed.to_string();
  };
  // The opening line may carry a language tag.
  let Some((_, body)) = body.split_once('\n') else {
    return trimmed.to_string();
  };
  if body.contains("```") {
    return trimmed.to_string();
  }
  body.trim_end().to_string()
}

fn http_client() -> Result<Client, GenerationError> {
  Client::builder()
    .no_proxy()
    .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
    .connect_timeout(HTTP_CONNECT_TIMEOUT)
    .timeout(HTTP_REQUEST_TIMEOUT)
    .build()
    .map_err(|e| GenerationError::Transport(format!("failed to create HTTP client: {e}")))
}

fn map_http_error(error: reqwest::Error) -> GenerationError {
  if error.is_timeout() {
    GenerationError::Transport(format!("request timed out: {error}"))
  } else if error.is_connect() {
    GenerationError::Transport(format!("connection error: {error}"))
  } else {
    GenerationError::Transport(error.to_string())
  }
}

/// Turn a non-success response into [`GenerationError::Http`].
async fn check_status(response: Response) -> Result<Response, GenerationError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
  Err(GenerationError::Http {
    status: status.as_u16(),
    message,
  })
}
