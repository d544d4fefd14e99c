//! HTTP model variants backed by an OpenAI-compatible chat endpoint.

use super::ModelBackend;
use crate::config::{Credential, DirectorConfig};
use crate::error::ModelError;
use crate::prompt::{parse_generation, Generation, GenerationRequest, PromptBuilder};
use async_trait::async_trait;
use llm::{ChatClient, Request};
use std::time::Duration;

/// Send a rendered request through a chat client and parse the reply.
async fn chat_generate(
    client: &ChatClient,
    timeout: Duration,
    request: &GenerationRequest,
) -> Result<Generation, ModelError> {
    let prompt = PromptBuilder::render(request);
    let chat = Request::new(prompt.user).with_system(prompt.system);

    let response = client.complete(chat).await.map_err(|e| match e {
        llm::Error::Timeout => ModelError::Timeout(timeout),
        other => ModelError::from(other),
    })?;
    parse_generation(&response.content)
}

fn build_client(
    endpoint: &str,
    model: &str,
    timeout: Duration,
    config: &DirectorConfig,
) -> Result<ChatClient, ModelError> {
    Ok(ChatClient::with_timeout(endpoint, timeout)
        .map_err(ModelError::from)?
        .with_model(model)
        .with_temperature(config.temperature)
        .with_no_temperature_models(config.no_temperature_models.iter().cloned()))
}

/// Locally hosted model; always tried first.
pub struct LocalModel {
    client: ChatClient,
    label: String,
    timeout: Duration,
}

impl LocalModel {
    pub fn new(client: ChatClient, timeout: Duration) -> Self {
        let label = format!("local:{}", client.model());
        Self {
            client,
            label,
            timeout,
        }
    }

    pub fn from_config(config: &DirectorConfig) -> Result<Self, ModelError> {
        let client = build_client(
            &config.local_endpoint,
            &config.local_model,
            config.timeout_local,
            config,
        )?;
        Ok(Self::new(client, config.timeout_local))
    }
}

#[async_trait]
impl ModelBackend for LocalModel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ModelError> {
        chat_generate(&self.client, self.timeout, request).await
    }
}

/// Remote API model; only ever used as a fallback and requires a credential.
pub struct RemoteModel {
    client: ChatClient,
    label: String,
    timeout: Duration,
}

impl RemoteModel {
    pub fn new(client: ChatClient, credential: &Credential, timeout: Duration) -> Self {
        let client = client.with_api_key(credential.expose());
        let label = format!("remote:{}", client.model());
        Self {
            client,
            label,
            timeout,
        }
    }

    /// `None` when the remote endpoint or credential is not configured.
    pub fn from_config(config: &DirectorConfig) -> Result<Option<Self>, ModelError> {
        let Some((endpoint, credential)) = config.remote() else {
            return Ok(None);
        };
        let client = build_client(endpoint, &config.remote_model, config.timeout_remote, config)?;
        Ok(Some(Self::new(client, credential, config.timeout_remote)))
    }
}

#[async_trait]
impl ModelBackend for RemoteModel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ModelError> {
        chat_generate(&self.client, self.timeout, request).await
    }
}
