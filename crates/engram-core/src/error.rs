// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory engine.

use thiserror::Error;

/// The primary error type used across all Engram crates.
///
/// "Not found" is never an error: lookups return `Option` and searches
/// return empty result sets.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Configuration errors (invalid TOML, out-of-range values, unknown fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input: dimension mismatch, unknown conversation or model,
    /// attempted mutation of immutable fields. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedding service is unreachable or its circuit is open.
    /// Transient; callers may retry after backoff.
    #[error("embedding service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Datastore errors (connection failure, query failure, corrupt row).
    #[error("datastore error: {source}")]
    Datastore {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Write against an archived conversation, or a lost dedup race.
    /// Surfaced, never retried automatically.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A batch or indexing job committed part of its work before failing.
    /// `succeeded` counts a contiguous prefix of the job's inputs, so the
    /// caller can resume from that offset.
    #[error("partial failure in job {job_id}: {succeeded} succeeded, {failed} failed: {message}")]
    PartialFailure {
        job_id: String,
        succeeded: usize,
        failed: usize,
        message: String,
    },

    /// A per-call budget elapsed before the external dependency answered.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngramError {
    /// True for failure classes worth retrying with backoff.
    ///
    /// Validation and conflict errors are deterministic and must surface
    /// immediately; retrying a conflict could worsen duplication.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngramError::ServiceUnavailable { .. } | EngramError::Timeout { .. }
        )
    }

    /// Shorthand for a boxed-source datastore error.
    pub fn datastore(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngramError::Datastore {
            source: Box::new(source),
        }
    }

    /// Shorthand for a service-unavailable error without an underlying source.
    pub fn unavailable(message: impl Into<String>) -> Self {
        EngramError::ServiceUnavailable {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EngramError::unavailable("down").is_transient());
        assert!(
            EngramError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_transient()
        );

        assert!(!EngramError::Validation("bad dimension".into()).is_transient());
        assert!(!EngramError::Conflict("archived".into()).is_transient());
        assert!(!EngramError::datastore(std::io::Error::other("disk")).is_transient());
        assert!(
            !EngramError::PartialFailure {
                job_id: "src-1".into(),
                succeeded: 3,
                failed: 2,
                message: "embedding failed".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn partial_failure_reports_counts() {
        let err = EngramError::PartialFailure {
            job_id: "src-9".into(),
            succeeded: 7,
            failed: 1,
            message: "chunk 7 embed failed".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("src-9"));
        assert!(rendered.contains("7 succeeded"));
        assert!(rendered.contains("1 failed"));
    }
}
