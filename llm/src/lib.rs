//! Minimal OpenAI-compatible chat completions client.
//!
//! This crate provides a focused client for `/chat/completions` endpoints with:
//! - Bearer authentication (optional, local servers usually run without it)
//! - Per-model temperature quirks
//! - JSON object extraction from free-form model output
//!
//! It works against LM Studio / llama.cpp style local servers as well as
//! hosted OpenAI-compatible APIs.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MODEL: &str = "gpt-oss-120b";
const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Errors that can occur when using the chat client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_decode() {
            Error::Parse(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Chat completions client bound to one endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    no_temperature_models: HashSet<String>,
}

impl ChatClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:1234/v1`) whose
    /// HTTP requests give up after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            no_temperature_models: HashSet::new(),
        })
    }

    /// Authenticate requests with a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the default sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Models that reject a non-default temperature; requests to them omit it.
    pub fn with_no_temperature_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.no_temperature_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// The model requests go to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let api_request = self.build_api_request(&request);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body.chars().take(1200).collect(),
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(Error::from_reqwest)?;

        parse_response(api_response)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
            );
        }
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request) -> ApiRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: request.user.clone(),
        });

        let temperature = if self.no_temperature_models.contains(&self.model) {
            None
        } else {
            Some(self.temperature)
        };

        ApiRequest {
            model: self.model.clone(),
            messages,
            temperature,
        }
    }
}

fn parse_response(api_response: ApiResponse) -> Result<Response, Error> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("response has no choices".to_string()))?;

    Ok(Response {
        id: api_response.id.unwrap_or_default(),
        model: api_response.model.unwrap_or_default(),
        content: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
    })
}

/// Find a JSON object in model output.
///
/// Tries a strict parse first, then the outermost `{...}` span. Returns
/// `None` when neither yields an object.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return value.is_object().then_some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
        .ok()
        .filter(serde_json::Value::is_object)
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request: one user turn with an optional system prompt.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub system: Option<String>,
    pub user: String,
}

impl Request {
    /// Create a new request carrying the given user message.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<String>,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
