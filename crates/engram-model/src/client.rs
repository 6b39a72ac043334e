use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Minimal Ollama HTTP client covering the two endpoints the pipeline
/// needs: `/api/generate` for summaries and `/api/embeddings` for
/// vectors. Per-call timeouts are supplied by the caller because the
/// two paths live on very different clocks (minutes vs seconds).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Low temperature keeps summaries close to the transcript.
    const TEMPERATURE: f32 = 0.3;
    /// Output token budget for one summary.
    const NUM_PREDICT: u32 = 600;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: Self::TEMPERATURE,
                num_predict: Self::NUM_PREDICT,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;
        Ok(parsed.response)
    }

    pub async fn embeddings(
        &self,
        model: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<Vec<f32>> {
        let request = EmbeddingsRequest {
            model,
            prompt: text,
        };

        let response = self
            .http
            .post(format!("{}/api/embeddings", self.base_url))
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status(status.as_u16(), body));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;
        Ok(parsed.embedding)
    }
}
