//! Client for a local Ollama server's `/api/generate` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Error)]
pub enum OllamaError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("json error: {0}")]
    Serde(String),
    #[error("empty response")]
    EmptyResponse,
}

impl OllamaError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Sampling options forwarded verbatim to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub num_ctx: u32,
    pub num_predict: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_k: 40,
            top_p: 0.9,
            num_ctx: 2048,
            num_predict: 250,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub options: GenerateOptions,
}

/// Anything that turns a prompt into raw model text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OllamaError>;
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// `{base}/api/generate`, keeping any path prefix on the base URL
fn generate_url(base_url: &Url) -> Result<Url, OllamaError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join("api/generate")
        .map_err(|e| OllamaError::Transport(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    generate_url: Url,
}

impl OllamaClient {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, OllamaError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quest-log/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OllamaError::Transport(e.to_string()))?;
        let generate_url = generate_url(base_url)?;

        Ok(Self { http, generate_url })
    }

    async fn send_request(&self, request: &GenerationRequest) -> Result<String, OllamaError> {
        let body = OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: &request.options,
        };
        let res = self
            .http
            .post(self.generate_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let parsed = res
                    .json::<OllamaResponse>()
                    .await
                    .map_err(|e| OllamaError::Serde(e.to_string()))?;
                debug!(
                    model = %request.model,
                    done = parsed.done,
                    response_length = parsed.response.len(),
                    "Ollama generation finished"
                );
                if parsed.response.trim().is_empty() {
                    return Err(OllamaError::EmptyResponse);
                }
                Ok(parsed.response)
            }
            StatusCode::NOT_FOUND => Err(OllamaError::ModelNotFound(request.model.clone())),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(OllamaError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OllamaError> {
        (|| async { self.send_request(request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_secs(2))
                    .with_max_times(2)
                    .with_jitter(),
            )
            .when(|e: &OllamaError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Ollama call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> OllamaError {
    if e.is_timeout() {
        OllamaError::Timeout
    } else {
        OllamaError::Transport(e.to_string())
    }
}

/// Locate the JSON array in model output that may be wrapped in prose or a
/// markdown code block.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let text = text.trim();
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
