//! OpenAI chat-completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationError, GenerationRequest, GenerativeClient, SYSTEM_PROMPT, check_status, http_client, map_http_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";

pub struct OpenAiClient {
  client: Client,
  api_key: String,
  base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  temperature: f64,
  max_tokens: u64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

impl OpenAiClient {
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
impl GenerativeClient for OpenAiClient {
  fn name(&self) -> &str {
    "openai"
  }

  async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
    let body = ChatRequest {
      model: request.model.as_deref().unwrap_or(DEFAULT_MODEL),
      messages: vec![
        ChatMessage {
          role: "system",
          content: SYSTEM_PROMPT,
        },
        ChatMessage {
          role: "user",
          content: &request.prompt,
        },
      ],
      temperature: request.temperature(),
      max_tokens: request.max_tokens(),
    };

    let url = format!("{}/chat/completions", self.base_url);
    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await
      .map_err(map_http_error)?;
    let response = check_status(response).await?;

    let completion: ChatResponse = response
      .json()
      .await
      .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    completion
      .choices
      .into_iter()
      .next()
      .and_then(|choice| choice.message.content)
      .map(|content| content.trim().to_string())
      .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_string()))
  }
}
