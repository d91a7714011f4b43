// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the engine.
//!
//! The embedding service and the source fetcher are the two external
//! dependencies; everything behind these traits is mockable in tests.

use async_trait::async_trait;

use crate::error::EngramError;

/// The external embedding-generation service.
///
/// Implementations must surface distinguishable error kinds: unknown model
/// and malformed input as [`EngramError::Validation`], unreachable service
/// as [`EngramError::ServiceUnavailable`], elapsed budgets as
/// [`EngramError::Timeout`]. The gateway's retry and circuit-breaker policy
/// depends on this distinction.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding for one text. Deterministic per (model, text).
    async fn generate(&self, model: &str, text: &str) -> Result<Vec<f32>, EngramError>;
}

/// Fetches raw bytes for a knowledge-source locator (URL or path).
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, EngramError>;
}
