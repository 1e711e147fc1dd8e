//! Generated sources, backed by a generative API.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{GeneratedSource, SourceError, SourceIdentity};
use crate::artifact::{ArtifactFile, FunctionArtifact};
use crate::cancel::CancelToken;
use crate::llm::{self, GenerationError, GenerationRequest, GenerativeClient};
use crate::manifest::{ProviderConfig, ProviderKind};

/// Resolves generated sources through named generative clients.
///
/// Clients are built on first use from the provider configuration and reused
/// for the rest of the run. A provider name with no configuration falls back
/// to the defaults of the kind it names (`openai`, `anthropic`).
pub struct GeneratedProvider {
  configs: BTreeMap<String, ProviderConfig>,
  clients: Mutex<HashMap<String, Arc<dyn GenerativeClient>>>,
  timeout: Duration,
}

impl GeneratedProvider {
  pub fn new(configs: BTreeMap<String, ProviderConfig>, timeout: Duration) -> Self {
    Self {
      configs,
      clients: Mutex::new(HashMap::new()),
      timeout,
    }
  }

  /// Register a ready-made client under a provider name.
  pub fn with_client(self, name: impl Into<String>, client: Arc<dyn GenerativeClient>) -> Self {
    self.clients.lock().insert(name.into(), client);
    self
  }

  fn client_for(&self, name: &str) -> Result<Arc<dyn GenerativeClient>, GenerationError> {
    if let Some(client) = self.clients.lock().get(name) {
      return Ok(client.clone());
    }

    let config = match self.configs.get(name) {
      Some(config) => config.clone(),
      None => {
        let kind = ProviderKind::from_name(name).ok_or_else(|| GenerationError::UnknownProvider(name.to_string()))?;
        ProviderConfig::for_kind(kind)
      }
    };
    let client = llm::build_client(name, &config)?;
    self.clients.lock().insert(name.to_string(), client.clone());
    Ok(client)
  }

  /// Call the provider for `source`, bounded by the generation timeout.
  pub async fn generate(
    &self,
    source: &GeneratedSource,
    identity: SourceIdentity,
    cancel: &CancelToken,
  ) -> Result<FunctionArtifact, SourceError> {
    let client = self
      .client_for(&source.provider)
      .map_err(|e| SourceError::GenerationFailed(e.to_string()))?;

    let request = GenerationRequest {
      model: source.model.clone(),
      prompt: source.prompt_text.clone(),
      params: source.params.clone(),
    };

    info!(
      identity = %identity,
      provider = client.name(),
      model = source.model.as_deref().unwrap_or("default"),
      "generating function code"
    );

    let text = tokio::select! {
      _ = cancel.cancelled() => return Err(SourceError::Cancelled),
      result = tokio::time::timeout(self.timeout, client.generate(&request)) => match result {
        Err(_) => return Err(SourceError::GenerationTimeout(self.timeout)),
        Ok(Err(e)) => return Err(SourceError::GenerationFailed(e.to_string())),
        Ok(Ok(text)) => text,
      },
    };

    let code = llm::strip_code_fence(&text);
    if code.is_empty() {
      return Err(SourceError::GenerationFailed("provider returned no code".to_string()));
    }

    debug!(identity = %identity, bytes = code.len(), "generation complete");
    Ok(FunctionArtifact::new(
      identity,
      vec![ArtifactFile::new(source.file_name(), code)],
    ))
  }
}
