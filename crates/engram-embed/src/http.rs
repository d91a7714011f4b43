// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for an OpenAI-compatible embeddings endpoint.
//!
//! Provides [`HttpEmbeddingService`], a single-attempt client that maps
//! HTTP outcomes onto the error kinds the gateway's retry and breaker
//! policy distinguishes. Retry and backoff live in the gateway, not here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use engram_core::error::EngramError;
use engram_core::traits::EmbeddingService;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for `POST {base_url}/embeddings`.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbeddingService {
    /// Creates a new embeddings client.
    ///
    /// The `request_timeout` here is a transport-level ceiling; the
    /// gateway applies its own per-attempt budget on top.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, EngramError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| EngramError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert("authorization", value);
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngramError::ServiceUnavailable {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn generate(&self, model: &str, text: &str) -> Result<Vec<f32>, EngramError> {
        let request = EmbeddingRequest { model, input: text };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngramError::Timeout {
                        duration: Duration::ZERO,
                    }
                } else {
                    EngramError::ServiceUnavailable {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        debug!(status = %status, model, "embedding response received");

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| EngramError::ServiceUnavailable {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
            let parsed: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| {
                EngramError::ServiceUnavailable {
                    message: format!("failed to parse embeddings response: {e}"),
                    source: Some(Box::new(e)),
                }
            })?;
            return parsed
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| EngramError::unavailable("embeddings response carried no data"));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => api_err.error.message,
            Err(_) => format!("API returned {status}: {body}"),
        };

        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(EngramError::Validation(detail))
            }
            status if status.as_u16() == 429 || status.is_server_error() => {
                Err(EngramError::ServiceUnavailable {
                    message: detail,
                    source: None,
                })
            }
            _ => Err(EngramError::Internal(detail)),
        }
    }
}
