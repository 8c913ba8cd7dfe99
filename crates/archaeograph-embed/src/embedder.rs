//! Embedding service clients.

use archaeograph_core::EmbeddingConfig;
use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("empty input")]
    EmptyInput,
    #[error("configuration: {0}")]
    Config(String),
}

/// Text → vector. One call per distinct text; the enricher does the caching.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Model identifier, for logs and the run manifest.
    fn model(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible HTTP embedder
// ============================================================================

pub struct OpenAiEmbedder {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EmbedError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api(format!("{status}: {error_text}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        parse_embedding_response(&data)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// First vector of an `{"data": [{"embedding": [...]}]}` response.
pub fn parse_embedding_response(data: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    let values = data["data"]
        .as_array()
        .and_then(|items| items.first())
        .and_then(|item| item["embedding"].as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing data[0].embedding".to_string()))?;
    let vector: Vec<f32> = values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();
    if vector.is_empty() || vector.len() != values.len() {
        return Err(EmbedError::InvalidResponse(
            "embedding is empty or has non-numeric entries".to_string(),
        ));
    }
    Ok(vector)
}

// ============================================================================
// Deterministic offline embedder
// ============================================================================

/// Feature-hashing embedder: each lowercase alphanumeric token adds ±1 to one
/// of `dims` buckets, and the result is L2-normalised. Needs no network.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    model: String,
}

impl HashEmbedder {
    pub const DEFAULT_DIMS: usize = 64;

    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model: format!("hash-{dims}"),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dims;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hash_embedder_is_deterministic_and_normalised() {
        let e = HashEmbedder::new(16);
        let a = e.embed_sync("Cemetery | Wadi bank | gravel");
        let b = e.embed_sync("cemetery | wadi BANK | Gravel");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
        assert_ne!(a, e.embed_sync("quarry"));
    }

    #[test]
    fn parses_openai_shape() {
        let data = serde_json::json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.5, -0.25, 1.0] }],
            "model": "text-embedding-3-small"
        });
        assert_eq!(parse_embedding_response(&data).unwrap(), vec![0.5, -0.25, 1.0]);
        assert!(parse_embedding_response(&serde_json::json!({ "data": [] })).is_err());
        assert!(parse_embedding_response(&serde_json::json!({
            "data": [{ "embedding": [1.0, "x"] }]
        }))
        .is_err());
    }

    #[test]
    fn openai_embedder_requires_a_key() {
        let config = EmbeddingConfig::default();
        assert!(matches!(OpenAiEmbedder::new(&config), Err(EmbedError::Config(_))));

        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://localhost:9/v1/".into(),
            ..EmbeddingConfig::default()
        };
        let e = OpenAiEmbedder::new(&config).unwrap();
        assert_eq!(e.url, "http://localhost:9/v1/embeddings");
        assert_eq!(e.model(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        assert!(matches!(
            HashEmbedder::default().embed("  ").await,
            Err(EmbedError::EmptyInput)
        ));
    }
}
