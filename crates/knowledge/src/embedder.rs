//! Thin client for an Ollama-compatible `/api/embeddings` endpoint, used to
//! produce dense vectors for both ingested chunks and search queries.

use std::time::Duration;

use ck_domain::error::{Error, Result};

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(15);

pub struct Embedder {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl Embedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({ "model": self.model, "prompt": text });

        let resp = self
            .http
            .post(&url)
            .timeout(EMBEDDING_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::DependencyFailure(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::DependencyFailure(format!(
                "embedding endpoint returned {}",
                resp.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingResponse {
            embedding: Vec<f32>,
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::DependencyFailure(format!("invalid embedding response: {e}")))?;

        Ok(parsed.embedding)
    }
}
