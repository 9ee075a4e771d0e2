//! Embedding and inference clients for an OpenAI-compatible API.
//!
//! Defines the [`Embedder`] and [`ChatModel`] traits and the concrete
//! [`ApiClient`] that implements both over HTTP. There is exactly one
//! code path for "text → vector": document segments and search queries
//! go through the same [`Embedder::embed`] call, so the two remain
//! comparable under cosine similarity.
//!
//! No retry happens at this layer. A failed embedding call surfaces to
//! the pipeline, which aborts that document's index attempt; a stalled
//! call is bounded only by the client's transport timeout.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{IndexError, Result};

/// Converts a text into a fixed-length embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
}

/// Performs one chat-completion call for retrieval-augmented answering.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Connectivity check against the backing API.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Returns whether the API answered with a success status.
    async fn probe(&self) -> Result<bool>;
}

/// HTTP client for an OpenAI-compatible embeddings/completions server.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    inference_model: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            inference_model: config.inference_model.clone(),
        })
    }

}

#[async_trait]
impl ConnectionProbe for ApiClient {
    /// GET `{base}/models`. Any 2xx counts as reachable.
    async fn probe(&self) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| IndexError::Inference(format!("connectivity probe failed: {}", e)))?;

        Ok(resp.status().is_success())
    }
}

#[async_trait]
impl Embedder for ApiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "input": text,
            "model": self.embedding_model,
        });

        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(IndexError::Embedding(format!(
                "embeddings API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        parse_embedding_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl ChatModel for ApiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.inference_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Inference(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(IndexError::Inference(format!(
                "chat API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IndexError::Inference(e.to_string()))?;

        parse_chat_response(&json)
    }
}

/// Extract `data[0].embedding` as a numeric vector.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            IndexError::Embedding("invalid embeddings response: missing data[0].embedding".into())
        })?;

    let mut vec = Vec::with_capacity(embedding.len());
    for v in embedding {
        let n = v.as_f64().ok_or_else(|| {
            IndexError::Embedding("invalid embeddings response: non-numeric element".into())
        })?;
        vec.push(n as f32);
    }

    Ok(vec)
}

/// Extract `choices[0].message.content` as the answer text.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            IndexError::Inference(
                "invalid chat response: missing choices[0].message.content".into(),
            )
        })
}
