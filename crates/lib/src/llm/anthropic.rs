//! Anthropic messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{GenerationError, GenerationRequest, GenerativeClient, SYSTEM_PROMPT, check_status, http_client, map_http_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
  client: Client,
  api_key: String,
  base_url: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)]
  content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(default)]
  text: Option<String>,
}

impl AnthropicClient {
  pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, GenerationError> {
    let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    Ok(Self {
      client: http_client()?,
      api_key,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }
}

#[async_trait]
impl GenerativeClient for AnthropicClient {
  fn name(&self) -> &str {
    "anthropic"
  }

  async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
    let body = json!({
      "model": request.model.as_deref().unwrap_or(DEFAULT_MODEL),
      "system": SYSTEM_PROMPT,
      "messages": [{ "role": "user", "content": request.prompt }],
      "max_tokens": request.max_tokens(),
      "temperature": request.temperature(),
    });

    let url = format!("{}/v1/messages", self.base_url);
    let response = self
      .client
      .post(&url)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .json(&body)
      .send()
      .await
      .map_err(map_http_error)?;
    let response = check_status(response).await?;

    let message: MessagesResponse = response
      .json()
      .await
      .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    message
      .content
      .into_iter()
      .next()
      .and_then(|block| block.text)
      .map(|text| text.trim().to_string())
      .ok_or_else(|| GenerationError::InvalidResponse("no content blocks in response".to_string()))
  }
}
