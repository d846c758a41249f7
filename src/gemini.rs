//! Gemini REST client for text generation and embeddings.
//!
//! The validator, augmenter and embedding store talk to the provider through
//! the [`TextModel`] and [`Embedder`] traits so tests can substitute stubs.

use crate::config::{AppConfig, EMBEDDING_MODEL, GEMINI_MODEL};
use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Completion backend seam.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Run a single prompt and return the raw text of the first candidate.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Embedding backend seam.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a document and return the raw (unnormalized) vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DiscoveryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
        })
    }
}

// --- Request/response structures for content generation ---

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

// --- Request/response structures for embedding ---

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'static str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", API_BASE, GEMINI_MODEL);

        let request_body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            // Low temperature for consistent scoring
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 1024,
            },
        };

        debug!(model = GEMINI_MODEL, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DiscoveryError::RateLimited(10));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Api {
                code: status.as_u16() as i32,
                message: format!("Gemini API error: {} - {}", status, error_text),
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(format!("Failed to parse Gemini response: {}", e)))?;

        parsed
            .candidates
            .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
            .and_then(|c| c.content)
            .and_then(|content| content.parts)
            .and_then(|mut p| if p.is_empty() { None } else { Some(p.remove(0)) })
            .and_then(|p| p.text)
            .ok_or_else(|| DiscoveryError::Parse("No text in Gemini response".to_string()))
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/{}:embedContent", API_BASE, EMBEDDING_MODEL);

        let request_body = EmbedContentRequest {
            model: format!("models/{}", EMBEDDING_MODEL),
            content: EmbedContent {
                parts: vec![Part { text }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
        };

        let response = self
            .client
            .post(&url)
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Api {
                code: status.as_u16() as i32,
                message: format!("Gemini embedding error: {} - {}", status, error_text),
            });
        }

        let parsed: EmbedContentResponse = response.json().await.map_err(|e| {
            DiscoveryError::Parse(format!("Failed to parse embedding response: {}", e))
        })?;

        Ok(parsed.embedding.values)
    }
}
