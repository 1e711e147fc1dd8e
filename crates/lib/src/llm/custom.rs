//! Client for self-hosted generation endpoints.
//!
//! The endpoint receives `{"prompt": ..., "parameters": {...}}` and answers
//! with `{"result": "..."}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationError, GenerationRequest, GenerativeClient, check_status, http_client, map_http_error};

pub struct CustomClient {
  client: Client,
  endpoint: String,
  api_key: Option<String>,
}

#[derive(Serialize)]
struct CustomRequest<'a> {
  prompt: &'a str,
  parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct CustomResponse {
  #[serde(default)]
  result: Option<String>,
}

impl CustomClient {
  pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, GenerationError> {
    Ok(Self {
      client: http_client()?,
      endpoint,
      api_key,
    })
  }
}

#[async_trait]
impl GenerativeClient for CustomClient {
  fn name(&self) -> &str {
    "custom"
  }

  async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
    let mut parameters: serde_json::Map<_, _> = request.params.clone().into_iter().collect();
    if let Some(model) = &request.model {
      parameters
        .entry("model")
        .or_insert_with(|| serde_json::Value::String(model.clone()));
    }
    let body = CustomRequest {
      prompt: &request.prompt,
      parameters,
    };

    let mut builder = self.client.post(&self.endpoint).json(&body);
    if let Some(key) = &self.api_key {
      builder = builder.bearer_auth(key);
    }
    let response = builder.send().await.map_err(map_http_error)?;
    let response = check_status(response).await?;

    let parsed: CustomResponse = response
      .json()
      .await
      .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    parsed
      .result
      .map(|text| text.trim().to_string())
      .ok_or_else(|| GenerationError::InvalidResponse("missing 'result' field".to_string()))
  }
}
