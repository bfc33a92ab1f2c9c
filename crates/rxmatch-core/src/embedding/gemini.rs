//! Gemini `embedContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{Embedder, EmbeddingError, EmbeddingResult};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_EMBEDDING_MODEL: &str = "embedding-001";

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Embeds text with the Gemini REST API.
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> EmbeddingResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: GEMINI_EMBEDDING_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Option<Vec<f32>>> {
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });

        debug!(chars = text.len(), model = %self.model, "requesting embedding");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            warn!(status, "embedding request rejected");
            return Err(EmbeddingError::Api { status, body });
        }

        let parsed: EmbedContentResponse = response.json().await?;
        parse_embedding(parsed).map(Some)
    }
}

fn parse_embedding(response: EmbedContentResponse) -> EmbeddingResult<Vec<f32>> {
    match response.embedding {
        Some(e) if !e.values.is_empty() => Ok(e.values),
        _ => Err(EmbeddingError::InvalidResponse(
            "no embedding values in response".into(),
        )),
    }
}
