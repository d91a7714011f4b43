// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The embedding gateway: the single path between the engine and the
//! external embedding service.
//!
//! Every request goes cache, then circuit breaker, then the service with a
//! per-attempt timeout and exponential backoff between transient failures.
//! Validation errors bypass retry entirely; they are deterministic and
//! retrying would only burn budget.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use engram_core::error::EngramError;
use engram_core::traits::EmbeddingService;

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker, Decision};
use crate::cache::{CacheConfig, EmbeddingCache};

/// Retry and concurrency policy for outbound embedding calls.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-attempt budget; an elapsed budget counts as a transient failure.
    pub request_timeout: Duration,
    /// Total attempts per text, first try included.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per retry.
    pub initial_backoff: Duration,
    /// In-flight ceiling for batch embedding.
    pub max_concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_concurrency: 4,
        }
    }
}

/// Cached, retried, breaker-guarded front of an [`EmbeddingService`].
pub struct EmbeddingGateway {
    service: Arc<dyn EmbeddingService>,
    cache: EmbeddingCache,
    breaker: CircuitBreaker,
    config: GatewayConfig,
}

impl EmbeddingGateway {
    pub fn new(
        service: Arc<dyn EmbeddingService>,
        cache: CacheConfig,
        breaker: BreakerConfig,
        config: GatewayConfig,
    ) -> Self {
        Self {
            service,
            cache: EmbeddingCache::new(cache),
            breaker: CircuitBreaker::new(breaker),
            config,
        }
    }

    /// Current breaker state, for health reporting.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Embed one text, consulting the cache first.
    ///
    /// Transient failures are retried with exponential backoff up to the
    /// configured attempt count. An open circuit rejects immediately
    /// without consuming an attempt against the service.
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, EngramError> {
        if let Some(vector) = self.cache.get(model, text) {
            return Ok(vector);
        }

        let mut last_err = EngramError::unavailable("no attempt made");
        for attempt in 1..=self.config.max_attempts {
            if self.breaker.check() == Decision::Reject {
                metrics::counter!("engram_embed_rejected_total").increment(1);
                return Err(EngramError::unavailable("embedding circuit open"));
            }

            metrics::counter!("engram_embed_requests_total").increment(1);
            let outcome = tokio::time::timeout(
                self.config.request_timeout,
                self.service.generate(model, text),
            )
            .await;

            match outcome {
                Ok(Ok(vector)) => {
                    self.breaker.on_success();
                    self.cache.put(model, text, vector.clone());
                    return Ok(vector);
                }
                Ok(Err(err)) if !err.is_transient() => {
                    // Deterministic failure: not the service's health.
                    return Err(err);
                }
                Ok(Err(err)) => {
                    last_err = err;
                }
                Err(_) => {
                    last_err = EngramError::Timeout {
                        duration: self.config.request_timeout,
                    };
                }
            }

            self.breaker.on_failure();
            metrics::counter!("engram_embed_failures_total").increment(1);
            if attempt < self.config.max_attempts {
                let backoff = self.config.initial_backoff * 2u32.pow(attempt - 1);
                debug!(model, attempt, backoff_ms = backoff.as_millis() as u64, "retrying embed");
                tokio::time::sleep(backoff).await;
            }
        }

        warn!(model, attempts = self.config.max_attempts, error = %last_err, "embed exhausted retries");
        Err(last_err)
    }

    /// Embed a batch of texts, results in input order.
    pub async fn embed_batch(
        &self,
        model: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EngramError> {
        self.embed_batch_with(model, texts, "batch", &CancellationToken::new())
            .await
    }

    /// Embed a batch with a cancellation hook.
    ///
    /// At most `max_concurrency` sub-calls are in flight; the token is
    /// observed between issuances, and in-flight calls are drained before
    /// returning. On cancellation or any sub-call failure the remaining
    /// texts are never issued and the error reports `succeeded` as the
    /// contiguous prefix of inputs that completed, so the caller can retry
    /// from that offset. Results behind a failed item are discarded.
    pub async fn embed_batch_with(
        &self,
        model: &str,
        texts: &[String],
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EngramError> {
        let mut pending = texts.iter();
        let mut in_flight = FuturesOrdered::new();
        let mut results: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut first_err: Option<EngramError> = None;
        let mut cancelled = false;

        loop {
            while first_err.is_none()
                && !cancelled
                && in_flight.len() < self.config.max_concurrency
            {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match pending.next() {
                    Some(text) => in_flight.push_back(self.embed(model, text)),
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(Ok(vector)) => {
                    // Successes draining in behind a failure are not part
                    // of the retryable prefix.
                    if first_err.is_none() {
                        results.push(vector);
                    }
                }
                Some(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                None => break,
            }
        }

        if cancelled || first_err.is_some() {
            let succeeded = results.len();
            let failed = texts.len() - succeeded;
            let message = match first_err {
                Some(err) => err.to_string(),
                None => "cancelled".to_string(),
            };
            warn!(job_id, succeeded, failed, %message, "batch embed interrupted");
            return Err(EngramError::PartialFailure {
                job_id: job_id.to_string(),
                succeeded,
                failed,
                message,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Fails the first `fail_first` calls with a transient error, then
    /// embeds every text as a single-element vector of its length.
    struct ScriptedService {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl ScriptedService {
        fn new(fail_first: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingService for ScriptedService {
        async fn generate(&self, _model: &str, text: &str) -> Result<Vec<f32>, EngramError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(EngramError::unavailable("scripted outage"));
            }
            Ok(vec![text.len() as f32])
        }
    }

    struct ValidationService;

    #[async_trait]
    impl EmbeddingService for ValidationService {
        async fn generate(&self, _model: &str, _text: &str) -> Result<Vec<f32>, EngramError> {
            Err(EngramError::Validation("unknown model".into()))
        }
    }

    struct HangingService;

    #[async_trait]
    impl EmbeddingService for HangingService {
        async fn generate(&self, _model: &str, _text: &str) -> Result<Vec<f32>, EngramError> {
            futures::future::pending().await
        }
    }

    fn gateway(service: Arc<dyn EmbeddingService>, config: GatewayConfig) -> EmbeddingGateway {
        EmbeddingGateway::new(
            service,
            CacheConfig::default(),
            BreakerConfig::default(),
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_skips_the_service() {
        let service = Arc::new(ScriptedService::new(0));
        let gw = gateway(service.clone(), GatewayConfig::default());

        let first = gw.embed("m", "hello").await.unwrap();
        let second = gw.embed("m", "hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let service = Arc::new(ScriptedService::new(2));
        let gw = gateway(service.clone(), GatewayConfig::default());

        let vector = gw.embed("m", "abc").await.unwrap();
        assert_eq!(vector, vec![3.0]);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let service = Arc::new(ScriptedService::new(usize::MAX));
        let gw = gateway(service.clone(), GatewayConfig::default());

        let err = gw.embed("m", "abc").await.unwrap_err();
        assert!(matches!(err, EngramError::ServiceUnavailable { .. }));
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_are_not_retried() {
        let gw = gateway(Arc::new(ValidationService), GatewayConfig::default());

        let err = gw.embed("m", "abc").await.unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
        assert_eq!(gw.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_transient() {
        let gw = gateway(
            Arc::new(HangingService),
            GatewayConfig {
                request_timeout: Duration::from_millis(50),
                max_attempts: 2,
                ..GatewayConfig::default()
            },
        );

        let err = gw.embed("m", "abc").await.unwrap_err();
        assert!(matches!(err, EngramError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_rejects_without_calling_the_service() {
        let service = Arc::new(ScriptedService::new(usize::MAX));
        let gw = EmbeddingGateway::new(
            service.clone(),
            CacheConfig::default(),
            BreakerConfig {
                failure_threshold: 5,
                window: Duration::from_secs(60),
                cooldown: Duration::from_secs(30),
            },
            GatewayConfig {
                max_attempts: 1,
                ..GatewayConfig::default()
            },
        );

        for _ in 0..5 {
            gw.embed("m", "x").await.unwrap_err();
        }
        assert_eq!(gw.breaker_state(), BreakerState::Open);
        let before = service.calls();

        let err = gw.embed("m", "x").await.unwrap_err();
        assert!(matches!(err, EngramError::ServiceUnavailable { .. }));
        assert_eq!(service.calls(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_preserves_input_order() {
        let service = Arc::new(ScriptedService::new(0));
        let gw = gateway(service, GatewayConfig::default());

        let texts: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into(), "dddd".into()];
        let vectors = gw.embed_batch("m", &texts).await.unwrap();
        assert_eq!(
            vectors,
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batch_failure_reports_committed_count() {
        // One transient failure exhausts a single-attempt budget; the rest
        // of the texts still in flight drain before the error returns.
        let service = Arc::new(ScriptedService::new(1));
        let gw = gateway(
            service,
            GatewayConfig {
                max_attempts: 1,
                max_concurrency: 1,
                ..GatewayConfig::default()
            },
        );

        let texts: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into()];
        let err = gw.embed_batch("m", &texts).await.unwrap_err();
        match err {
            EngramError::PartialFailure {
                succeeded, failed, ..
            } => {
                assert_eq!(succeeded, 0);
                assert_eq!(failed, 3);
            }
            other => panic!("expected partial failure, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_failure_counts_only_the_prefix() {
        // With four texts in flight at once, the first fails while the
        // other three succeed on drain; those successes sit behind the
        // failure and must not count as committed.
        let service = Arc::new(ScriptedService::new(1));
        let gw = gateway(
            service,
            GatewayConfig {
                max_attempts: 1,
                max_concurrency: 4,
                ..GatewayConfig::default()
            },
        );

        let texts: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into(), "dddd".into()];
        let err = gw.embed_batch("m", &texts).await.unwrap_err();
        match err {
            EngramError::PartialFailure {
                succeeded, failed, ..
            } => {
                assert_eq!(succeeded, 0);
                assert_eq!(failed, 4);
            }
            other => panic!("expected partial failure, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_batch_issues_nothing() {
        let service = Arc::new(ScriptedService::new(0));
        let gw = gateway(service.clone(), GatewayConfig::default());

        let token = CancellationToken::new();
        token.cancel();
        let texts: Vec<String> = vec!["a".into(), "bb".into()];
        let err = gw
            .embed_batch_with("m", &texts, "job-1", &token)
            .await
            .unwrap_err();

        match err {
            EngramError::PartialFailure {
                job_id,
                succeeded,
                failed,
                ..
            } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(succeeded, 0);
                assert_eq!(failed, 2);
            }
            other => panic!("expected partial failure, got {other}"),
        }
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_a_no_op() {
        let gw = gateway(Arc::new(ScriptedService::new(0)), GatewayConfig::default());
        let vectors = gw.embed_batch("m", &[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
