//! Text generation backends
//!
//! The manuscript generator only needs `generate_text(prompt) -> text`. Each
//! provider implements [`TextGenerator`] over its own REST API.

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{resolve_secret, GeminiConfig, OpenaiConfig, TextBackend, TextGenConfig};
use crate::error::{PodcastError, PodcastResult};

/// Trait for text generation clients
///
/// Implementations must be usable from the run worker, hence `Send + Sync`.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a single prompt and return the generated text
    async fn generate_text(&self, prompt: &str) -> PodcastResult<String>;

    /// Backend name for logs
    fn backend_name(&self) -> &str;
}

/// Create the configured text generation backend
///
/// Fails with `ProviderUnavailable`-style configuration errors when the
/// backend's API key cannot be resolved.
pub fn create_text_generator(
    config: &TextGenConfig,
    timeout: Duration,
) -> PodcastResult<Arc<dyn TextGenerator>> {
    let client: Arc<dyn TextGenerator> = match config.backend {
        TextBackend::Gemini => Arc::new(GeminiClient::new(&config.gemini, timeout)?),
        TextBackend::Openai => Arc::new(OpenaiClient::new(&config.openai, timeout)?),
    };
    ::log::info!("Text generation backend: {}", client.backend_name());
    Ok(client)
}

/// HTTP client with the configured request timeout
pub(crate) fn build_http_client(timeout: Duration, proxy: bool) -> PodcastResult<HttpClient> {
    let builder = HttpClient::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(30));
    let builder = if proxy { builder } else { builder.no_proxy() };
    builder
        .build()
        .map_err(|e| PodcastError::Config(format!("failed to build HTTP client: {}", e)))
}

fn require_key(value: &str, backend: &str) -> PodcastResult<String> {
    resolve_secret(value).ok_or_else(|| {
        PodcastError::Config(format!("API key for text backend '{}' is not set", backend))
    })
}

async fn read_success_body(response: reqwest::Response, backend: &str) -> PodcastResult<String> {
    let status = response.status();
    ::log::debug!("[{}] Response status: {}", backend, status);

    let body = response.text().await.map_err(|e| {
        PodcastError::ManuscriptGenerationFailed(format!("{}: failed to read response: {}", backend, e))
    })?;

    if !status.is_success() {
        ::log::error!("[{}] Error response: {}", backend, body);
        return Err(PodcastError::ManuscriptGenerationFailed(format!(
            "{} API error ({}): {}",
            backend, status, body
        )));
    }
    Ok(body)
}

// ============================================================================
// GEMINI
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini `generateContent` client
#[derive(Debug)]
pub struct GeminiClient {
    model: String,
    api_key: String,
    api_url: String,
    client: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> PodcastResult<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key: require_key(&config.api_key, "gemini")?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout, config.proxy)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        json!({ "contents": [{ "parts": [{ "text": prompt }] }] })
    }

    fn extract_text(body: &str) -> PodcastResult<String> {
        let response: GeminiResponse = serde_json::from_str(body).map_err(|e| {
            PodcastError::ManuscriptGenerationFailed(format!("failed to parse Gemini response: {}", e))
        })?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PodcastError::ManuscriptGenerationFailed(
                "Gemini returned no text".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> PodcastResult<String> {
        ::log::debug!("[gemini] Sending {} char prompt to {}", prompt.len(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt))
            .send()
            .await
            .map_err(|e| PodcastError::ManuscriptGenerationFailed(format!("Gemini request failed: {}", e)))?;

        let body = read_success_body(response, "gemini").await?;
        Self::extract_text(&body)
    }

    fn backend_name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// OPENAI
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI (and OpenAI-compatible) chat completions client
#[derive(Debug)]
pub struct OpenaiClient {
    model: String,
    api_key: String,
    api_url: String,
    client: HttpClient,
}

impl OpenaiClient {
    pub fn new(config: &OpenaiConfig, timeout: Duration) -> PodcastResult<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key: require_key(&config.api_key, "openai")?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout, config.proxy)?,
        })
    }

    fn extract_text(body: &str) -> PodcastResult<String> {
        let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
            PodcastError::ManuscriptGenerationFailed(format!("failed to parse chat response: {}", e))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PodcastError::ManuscriptGenerationFailed("chat completion returned no content".into())
            })
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenaiClient {
    async fn generate_text(&self, prompt: &str) -> PodcastResult<String> {
        ::log::debug!(
            "[openai] Sending request to: {}/chat/completions ({})",
            self.api_url,
            self.model
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| PodcastError::ManuscriptGenerationFailed(format!("chat request failed: {}", e)))?;

        let body = read_success_body(response, "openai").await?;
        Self::extract_text(&body)
    }

    fn backend_name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================
