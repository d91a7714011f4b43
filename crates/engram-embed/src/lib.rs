// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding acquisition for the Engram memory engine.
//!
//! The [`gateway::EmbeddingGateway`] is the only type the engine talks to:
//! it fronts an [`engram_core::traits::EmbeddingService`] implementation
//! with an LRU+TTL cache, a circuit breaker, per-attempt timeouts, and
//! bounded retry. [`http::HttpEmbeddingService`] is the production
//! implementation for OpenAI-compatible `/embeddings` endpoints.

pub mod breaker;
pub mod cache;
pub mod gateway;
pub mod http;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use cache::{CacheConfig, EmbeddingCache};
pub use gateway::{EmbeddingGateway, GatewayConfig};
pub use http::HttpEmbeddingService;
