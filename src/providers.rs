use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{RevisionConfig, TranscriptionConfig};
use crate::error::ProviderError;
use crate::transcribe::TranscriptSegment;

/// What one transcription call returns for one audio segment
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub duration_sec: f64,
    pub language: String,
}

/// External speech-to-text capability, one call per audio segment.
///
/// Implementations do their own timeouts and retries; the pipeline treats
/// any error as "this segment produced nothing" and moves on.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionOutput, ProviderError>;
}

/// External text-revision capability, one call per text chunk.
///
/// The response is free-form natural language; extracting the revised
/// text out of it is the enhancer's job, not the client's.
#[async_trait]
pub trait RevisionClient: Send + Sync {
    async fn revise(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Transcription over an OpenAI-compatible audio transcription endpoint
pub struct HttpTranscriptionClient {
    config: TranscriptionConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WireTranscription {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    id: i64,
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

impl HttpTranscriptionClient {
    pub fn new(config: TranscriptionConfig) -> Result<Self, ProviderError> {
        if requires_api_key(&config.endpoint) && config.api_key.is_none() {
            return Err(ProviderError::MissingCredentials);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TranscriptionClient for HttpTranscriptionClient {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionOutput, ProviderError> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", self.config.model.clone())
            .text("language", language.to_string())
            .text("response_format", "verbose_json");

        debug!("uploading {} for transcription", audio_path.display());

        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let wire: WireTranscription = response.json().await?;

        let segments = wire
            .segments
            .into_iter()
            .map(|s| TranscriptSegment {
                id: s.id.to_string(),
                text: s.text.trim().to_string(),
                start_sec: s.start,
                end_sec: s.end,
                confidence: s
                    .avg_logprob
                    .map(|lp| lp.exp().clamp(0.0, 1.0))
                    .unwrap_or(1.0),
            })
            .collect::<Vec<_>>();

        let duration_sec = wire
            .duration
            .unwrap_or_else(|| segments.last().map(|s| s.end_sec).unwrap_or(0.0));

        Ok(TranscriptionOutput {
            text: wire.text.trim().to_string(),
            segments,
            duration_sec,
            language: wire.language.unwrap_or_else(|| language.to_string()),
        })
    }
}

/// Revision over an OpenAI-compatible chat completions endpoint
pub struct HttpRevisionClient {
    config: RevisionConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl HttpRevisionClient {
    pub fn new(config: RevisionConfig) -> Result<Self, ProviderError> {
        if requires_api_key(&config.endpoint) && config.api_key.is_none() {
            return Err(ProviderError::MissingCredentials);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl RevisionClient for HttpRevisionClient {
    async fn revise(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!("sending revision request to {}", self.config.endpoint);

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(content)
    }
}

/// The hosted default endpoints reject anonymous requests outright, so a
/// missing key there is a configuration error worth failing fast on.
/// Self-hosted endpoints routinely run without authentication.
fn requires_api_key(endpoint: &str) -> bool {
    endpoint.contains("api.openai.com")
}

/// Build the shipped transcription client from configuration
pub fn create_transcription_client(
    config: &TranscriptionConfig,
) -> Result<Arc<dyn TranscriptionClient>, ProviderError> {
    Ok(Arc::new(HttpTranscriptionClient::new(config.clone())?))
}

/// Build the shipped revision client from configuration
pub fn create_revision_client(
    config: &RevisionConfig,
) -> Result<Arc<dyn RevisionClient>, ProviderError> {
    Ok(Arc::new(HttpRevisionClient::new(config.clone())?))
}
